use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::comment::Comment;
use super::scroll_mode::ScrollMode;

/// Unique identifier for one comment session (one per `start`, never reused).
pub type SessionId = Uuid;

/// Lifecycle of a comment session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Failed,
    Destroyed,
}

/// Event published to UI layers and the video player.
/// Subscribers receive these in the order the engine produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelEvent {
    /// The session moved to a new lifecycle state.
    StateChanged {
        session_id: SessionId,
        state: SessionState,
    },

    /// Connecting failed. The session stays in `Failed` until destroyed.
    SessionFailed { session_id: SessionId, reason: String },

    /// Comments were appended to the display list, oldest first.
    CommentsAppended {
        comments: Vec<Comment>,
        /// True for the initial batch delivered at session start.
        backlog: bool,
    },

    /// Oldest comments fell out of the retained window.
    CommentsEvicted { count: usize },

    /// A re-filter pass removed already displayed comments.
    CommentsRemoved { count: usize },

    /// The list should jump to its newest comment (programmatic scroll).
    ScrollToBottom,

    ScrollModeChanged { mode: ScrollMode },

    /// Command for the video player to draw this comment over the video.
    RenderOverlay { comment: Comment },
}
