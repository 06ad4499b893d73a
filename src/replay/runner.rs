use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use futures_util::StreamExt;
use serde_json::json;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{info, warn};

use crate::engine::events::PanelEvent;
use crate::engine::mute_filter::MutedKeyword;
use crate::engine::panel::CommentPanel;

use super::script::Step;
use super::transport::ReplayTransport;

/// How long to wait for in-flight transport work before running the next step.
const SETTLE: Duration = Duration::from_millis(10);

/// Drives a [`CommentPanel`] from a script and writes every resulting event
/// as one JSON object per line.
pub struct Replay<W: Write> {
    panel: CommentPanel<ReplayTransport>,
    transport: Arc<ReplayTransport>,
    events: mpsc::UnboundedReceiver<PanelEvent>,
    out: W,
}

impl<W: Write> Replay<W> {
    pub fn new(mut panel: CommentPanel<ReplayTransport>, transport: Arc<ReplayTransport>, out: W) -> Self {
        let events = panel.subscribe();
        Self {
            panel,
            transport,
            events,
            out,
        }
    }

    pub fn panel(&self) -> &CommentPanel<ReplayTransport> {
        &self.panel
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run every step read from `reader`. Returns the number of steps applied.
    pub async fn run<R: AsyncRead + Unpin>(&mut self, reader: R) -> anyhow::Result<usize> {
        let mut lines = FramedRead::new(reader, LinesCodec::new());
        let mut line_no = 0;
        let mut applied = 0;

        while let Some(line) = lines.next().await {
            line_no += 1;
            let line = line.with_context(|| format!("failed to read script line {}", line_no))?;
            let Some(step) = Step::parse_line(&line)
                .with_context(|| format!("invalid step on line {}", line_no))?
            else {
                continue;
            };
            self.apply(step).await?;
            applied += 1;
        }

        self.panel.settle(SETTLE).await;
        self.flush_events()?;
        info!(steps = applied, "replay finished");
        Ok(applied)
    }

    pub async fn apply(&mut self, step: Step) -> anyhow::Result<()> {
        // Live comments queue up in the inbox; anything else must observe them first.
        if !matches!(step, Step::Comment { .. }) {
            self.panel.settle(SETTLE).await;
        }

        match step {
            Step::Backlog { target, comments } => self.transport.set_backlog(target, comments),
            Step::FailTarget { target, reason } => self.transport.fail_target(target, reason),
            Step::Start { target } => {
                self.panel
                    .start_session(target)
                    .await
                    .map_err(anyhow::Error::msg)?;
                self.panel.settle(SETTLE).await;
            }
            Step::Comment { comment } => {
                if !self.transport.push(comment) {
                    warn!("no open comment feed, dropping scripted comment");
                }
            }
            Step::Visibility { visible } => {
                self.panel.set_visibility(visible, Instant::now())
            }
            Step::Player { paused } => self.panel.set_player_paused(paused),
            Step::Scroll { signal } => self.panel.on_scroll_signal(signal, Instant::now()),
            Step::Send { viewer, payload } => {
                let result = self.panel.send_comment(&viewer, payload).await;
                let line = match result {
                    Ok(()) => json!({ "type": "send_result", "ok": true }),
                    Err(e) => json!({ "type": "send_result", "ok": false, "error": e.to_string() }),
                };
                self.flush_events()?;
                writeln!(self.out, "{}", line)?;
            }
            Step::MuteKeyword { pattern, match_mode } => {
                self.panel
                    .add_muted_keyword(MutedKeyword::new(pattern, match_mode))
                    .await;
            }
            Step::MuteUser { user_id } => {
                self.panel.add_muted_user_id(user_id).await;
            }
            Step::MuteFlags { flags } => {
                self.panel.set_mute_flags(flags).await;
            }
            Step::Refilter => {
                self.panel.refilter();
            }
            Step::Destroy => self.panel.destroy_session(),
            Step::Wait { ms } => {
                self.panel.settle(Duration::from_millis(ms)).await;
            }
            Step::Dump => {
                self.flush_events()?;
                let line = json!({ "type": "display_list", "comments": self.panel.display_list() });
                writeln!(self.out, "{}", line)?;
            }
        }

        self.flush_events()
    }

    fn flush_events(&mut self) -> anyhow::Result<()> {
        while let Ok(event) = self.events.try_recv() {
            writeln!(self.out, "{}", serde_json::to_string(&event)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::events::SessionState;

    fn replay() -> Replay<Vec<u8>> {
        let transport = Arc::new(ReplayTransport::new());
        let panel = CommentPanel::new(transport.clone(), &EngineConfig::default(), None);
        Replay::new(panel, transport, Vec::new())
    }

    fn output_lines(replay: Replay<Vec<u8>>) -> Vec<serde_json::Value> {
        let out = String::from_utf8(replay.into_output()).unwrap();
        out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_script_round() {
        let script = r#"
# channel with a little history
{"step":"backlog","target":"jk1","comments":[{"text":"hello","time":"20:00:00"}]}
{"step":"start","target":"jk1"}
{"step":"mute_keyword","pattern":"spam"}
{"step":"comment","comment":{"text":"first","time":"20:00:01","user_id":"a"}}
{"step":"comment","comment":{"text":"this is spam content","time":"20:00:02","user_id":"b"}}
{"step":"visibility","visible":false}
{"step":"comment","comment":{"text":"while hidden","time":"20:00:03","user_id":"c"}}
{"step":"wait","ms":20}
{"step":"visibility","visible":true}
{"step":"dump"}
"#;
        let mut replay = replay();
        let steps = replay.run(script.as_bytes()).await.unwrap();
        assert_eq!(steps, 10);
        assert_eq!(replay.panel().state(), SessionState::Active);

        let texts: Vec<String> = replay
            .panel()
            .display_list()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, ["hello", "first", "while hidden"]);

        let lines = output_lines(replay);
        let dump = lines.iter().find(|l| l["type"] == "display_list").unwrap();
        assert_eq!(dump["comments"].as_array().unwrap().len(), 3);
        assert!(lines.iter().any(|l| l["type"] == "comments_appended" && l["backlog"] == true));
    }

    #[tokio::test]
    async fn test_send_result_is_reported() {
        let script = r#"
{"step":"start","target":"jk1"}
{"step":"send","payload":{"text":"hi"}}
{"step":"send","viewer":{"logged_in":true,"linked_identity":"me"},"payload":{"text":"hi"}}
"#;
        let mut replay = replay();
        replay.run(script.as_bytes()).await.unwrap();
        let lines = output_lines(replay);
        let results: Vec<_> = lines.iter().filter(|l| l["type"] == "send_result").collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["ok"], false);
        assert_eq!(results[0]["error"], "log in to post comments");
        assert_eq!(results[1]["ok"], true);
    }

    #[tokio::test]
    async fn test_invalid_line_reports_position() {
        let mut replay = replay();
        let err = replay
            .run("{\"step\":\"start\",\"target\":\"jk1\"}\nnot json\n".as_bytes())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
