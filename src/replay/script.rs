use serde::Deserialize;

use crate::engine::comment::{Comment, CommentPayload, TargetId};
use crate::engine::mute_filter::{MatchMode, MuteFlags};
use crate::engine::scroll_mode::ScrollSignal;
use crate::engine::validation::Viewer;

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Prior comments the transport will hand out when `target` is connected.
    Backlog {
        target: TargetId,
        comments: Vec<Comment>,
    },
    /// Make connecting to `target` fail.
    FailTarget { target: TargetId, reason: String },
    Start { target: TargetId },
    /// A live comment arriving on the open feed.
    Comment { comment: Comment },
    Visibility { visible: bool },
    Player { paused: bool },
    Scroll { signal: ScrollSignal },
    Send {
        #[serde(default)]
        viewer: Viewer,
        payload: CommentPayload,
    },
    MuteKeyword {
        pattern: String,
        #[serde(rename = "match", default)]
        match_mode: MatchMode,
    },
    MuteUser { user_id: String },
    MuteFlags { flags: MuteFlags },
    Refilter,
    Destroy,
    /// Let in-flight transport work land for `ms` milliseconds.
    Wait { ms: u64 },
    /// Print the current display list.
    Dump,
}

impl Step {
    /// Parse one script line. Blank lines and `#` comments yield `None`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }
}
