use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;

use super::comment::{Comment, CommentPayload, TargetId};
use super::events::{PanelEvent, SessionId, SessionState};
use super::mute_filter::{MuteFilter, MuteFlags, MuteSettings, MutedKeyword};
use super::retained_window::RetainedWindow;
use super::scroll_mode::{ScrollMode, ScrollModeDetector, ScrollSignal};
use super::transport::{Connection, Subscription, TransportError};
use super::validation::{self, SendError, Viewer};
use super::visibility_buffer::{Ingested, VisibilityBuffer};

/// Identifies one `start` call. Responses carrying an older generation are stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub generation: u64,
    pub target: TargetId,
}

/// Owns the comment feed for one playback target and everything displayed from it.
///
/// Purely synchronous: the async side (transport round trips, feed forwarding)
/// lives in [`super::panel::CommentPanel`], which calls back into this type
/// with whatever arrived, tagged with the generation it was issued under.
pub struct SessionManager {
    session_id: SessionId,
    target: Option<TargetId>,
    state: SessionState,
    /// Bumped on every `start`.
    generation: u64,
    failure_reason: Option<String>,
    backlog_limit: usize,
    max_comment_length: usize,
    overflow_cap: Option<usize>,
    window: RetainedWindow,
    buffer: VisibilityBuffer,
    scroll: ScrollModeDetector,
    filter: MuteFilter,
    /// Last known tab visibility, kept even while no session is running.
    tab_visible: bool,
    player_paused: bool,
    subscription: Option<Subscription>,
    subscribers: Vec<mpsc::UnboundedSender<PanelEvent>>,
}

impl SessionManager {
    pub fn new(config: &EngineConfig, mutes: MuteSettings) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target: None,
            state: SessionState::Idle,
            generation: 0,
            failure_reason: None,
            backlog_limit: config.session.backlog_limit,
            max_comment_length: config.session.max_comment_length,
            overflow_cap: config.display.overflow_cap,
            window: RetainedWindow::new(config.display.retained_limit),
            buffer: VisibilityBuffer::new(config.display.overflow_cap),
            scroll: ScrollModeDetector::new(
                config.scroll.debounce(),
                config.scroll.bottom_threshold_px,
            ),
            filter: MuteFilter::new(mutes),
            tab_visible: true,
            player_paused: false,
            subscription: None,
            subscribers: Vec::new(),
        }
    }

    /// Register a listener for panel events.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PanelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn target(&self) -> Option<&TargetId> {
        self.target.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn backlog_limit(&self) -> usize {
        self.backlog_limit
    }

    pub fn display_list(&self) -> Vec<Comment> {
        self.window.snapshot()
    }

    pub fn scroll_mode(&self) -> ScrollMode {
        self.scroll.mode()
    }

    /// Comments held back while the tab is hidden.
    pub fn pending_hidden(&self) -> usize {
        self.buffer.pending()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Begin connecting to `target`. Only valid from `Idle`; a previous
    /// session must be destroyed and reset first.
    pub fn start(&mut self, target: TargetId) -> Result<SessionHandle, String> {
        if self.state != SessionState::Idle {
            return Err(format!(
                "session {} is {:?}, destroy it before starting another",
                self.session_id, self.state
            ));
        }

        self.generation += 1;
        self.target = Some(target.clone());
        self.set_state(SessionState::Connecting);

        info!(session_id = %self.session_id, %target, generation = self.generation, "comment session connecting");

        Ok(SessionHandle {
            session_id: self.session_id,
            generation: self.generation,
            target,
        })
    }

    /// Apply the transport's connect response. On success the backlog is shown
    /// at once and the live feed is handed back to the caller to forward.
    pub fn on_connected(
        &mut self,
        handle: &SessionHandle,
        result: Result<Connection, TransportError>,
        now: Instant,
    ) -> Option<mpsc::UnboundedReceiver<Comment>> {
        if !self.is_current(handle.generation) || self.state != SessionState::Connecting {
            debug!(session_id = %handle.session_id, generation = handle.generation, "discarding stale connect response");
            if let Ok(connection) = result {
                connection.subscription.unsubscribe();
            }
            return None;
        }

        let connection = match result {
            Ok(connection) => connection,
            Err(e) => {
                let reason = e.to_string();
                warn!(session_id = %self.session_id, error = %reason, "comment session failed");
                self.failure_reason = Some(reason.clone());
                self.set_state(SessionState::Failed);
                self.publish(PanelEvent::SessionFailed {
                    session_id: self.session_id,
                    reason,
                });
                return None;
            }
        };

        let mut backlog: Vec<Comment> = connection
            .backlog
            .into_iter()
            .filter(|c| !self.filter.is_muted(c))
            .collect();
        if backlog.len() > self.backlog_limit {
            backlog.drain(..backlog.len() - self.backlog_limit);
        }

        self.subscription = Some(connection.subscription);
        self.set_state(SessionState::Active);

        // Backlog never goes through the visibility buffer.
        let evict = self.follows();
        let (appended, evicted) = self.window.append(backlog, evict);
        info!(session_id = %self.session_id, count = appended.len(), "backlog delivered");

        self.publish_evicted(evicted);
        if !appended.is_empty() {
            self.publish(PanelEvent::CommentsAppended {
                comments: appended,
                backlog: true,
            });
            self.follow_newest(now);
        }

        Some(connection.feed)
    }

    /// Live comment from the feed opened under `generation`.
    /// Returns true if the comment was accepted (displayed or buffered).
    pub fn on_comment_received(&mut self, generation: u64, comment: Comment, now: Instant) -> bool {
        if !self.is_current(generation) || self.state != SessionState::Active {
            debug!(generation, "dropping comment for inactive session");
            return false;
        }
        if self.filter.is_muted(&comment) {
            return false;
        }
        self.display(comment, now);
        true
    }

    /// Everything about a send that can be checked locally.
    pub fn prepare_send(&self, viewer: &Viewer, payload: &CommentPayload) -> Result<SessionHandle, SendError> {
        let target = match (&self.target, self.state) {
            (Some(target), SessionState::Active) => target.clone(),
            _ => return Err(SendError::NoActiveSession),
        };
        validation::validate_send(viewer, payload, self.max_comment_length)?;
        Ok(SessionHandle {
            session_id: self.session_id,
            generation: self.generation,
            target,
        })
    }

    /// The transport accepted a post; show it locally as our own comment.
    pub fn on_sent(&mut self, handle: &SessionHandle, comment: Comment, now: Instant) -> bool {
        if !self.is_current(handle.generation) || self.state != SessionState::Active {
            return false;
        }
        self.display(comment, now);
        true
    }

    pub fn set_visibility(&mut self, visible: bool, now: Instant) {
        self.tab_visible = visible;
        if self.state == SessionState::Destroyed {
            return;
        }

        let evict = self.follows();
        if let Some(flushed) = self.buffer.set_visible(visible, &mut self.window, evict) {
            debug!(session_id = %self.session_id, count = flushed.comments.len(), "flushing hidden comments");
            self.publish_evicted(flushed.evicted);
            if !flushed.comments.is_empty() {
                self.publish(PanelEvent::CommentsAppended {
                    comments: flushed.comments,
                    backlog: false,
                });
                self.follow_newest(now);
            }
        }
    }

    pub fn set_player_paused(&mut self, paused: bool) {
        self.player_paused = paused;
    }

    pub fn on_scroll_signal(&mut self, signal: ScrollSignal, now: Instant) {
        if self.state == SessionState::Destroyed {
            return;
        }

        let reaction = self.scroll.handle(signal, now);
        if let Some(mode) = reaction.mode_changed {
            debug!(session_id = %self.session_id, ?mode, "scroll mode changed");
            self.publish(PanelEvent::ScrollModeChanged { mode });
            if mode == ScrollMode::Auto {
                // Catch up on eviction skipped while the user was reading history.
                let evicted = self.window.enforce_limit();
                self.publish_evicted(evicted);
            }
        }
        if reaction.scroll_to_bottom {
            self.publish(PanelEvent::ScrollToBottom);
        }
    }

    pub fn mute_settings(&self) -> MuteSettings {
        self.filter.settings()
    }

    pub fn replace_mute_settings(&mut self, settings: MuteSettings) {
        self.filter.replace(settings);
    }

    pub fn is_muted(&self, comment: &Comment) -> bool {
        self.filter.is_muted(comment)
    }

    pub fn add_muted_keyword(&mut self, keyword: MutedKeyword) -> bool {
        self.filter.add_keyword(keyword)
    }

    pub fn edit_muted_keyword(&mut self, index: usize, keyword: MutedKeyword) -> bool {
        self.filter.edit_keyword(index, keyword)
    }

    pub fn remove_muted_keyword(&mut self, index: usize) -> bool {
        self.filter.remove_keyword(index).is_some()
    }

    pub fn add_muted_user_id(&mut self, user_id: String) -> bool {
        self.filter.add_user_id(user_id)
    }

    pub fn remove_muted_user_id(&mut self, user_id: &str) -> bool {
        self.filter.remove_user_id(user_id)
    }

    pub fn mute_author_of(&mut self, comment: &Comment) -> bool {
        self.filter.mute_author_of(comment)
    }

    pub fn set_mute_flags(&mut self, flags: MuteFlags) -> bool {
        if self.filter.flags() == flags {
            return false;
        }
        self.filter.set_flags(flags);
        true
    }

    /// Sweep the display list and the hidden buffer with the current mute rules.
    /// Returns the number of displayed comments removed.
    pub fn refilter(&mut self) -> usize {
        let filter = &self.filter;
        let removed = self.window.retain(|c| !filter.is_muted(c));
        let buffered = self.buffer.retain(|c| !filter.is_muted(c));
        debug!(session_id = %self.session_id, removed, buffered, "re-filtered comments");
        if removed > 0 {
            self.publish(PanelEvent::CommentsRemoved { count: removed });
        }
        removed
    }

    /// Tear the session down. Safe to call any number of times, including
    /// while a connect is still in flight.
    pub fn destroy(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.window.clear();
        self.buffer.clear();
        self.scroll.reset();
        self.set_state(SessionState::Destroyed);
        info!(session_id = %self.session_id, "comment session destroyed");
    }

    /// Prepare a fresh, idle session after `destroy`. The generation counter
    /// carries over so responses for the old session stay recognisably stale.
    pub fn reset(&mut self) {
        if self.state != SessionState::Destroyed && self.state != SessionState::Idle {
            self.destroy();
        }
        self.session_id = Uuid::new_v4();
        self.target = None;
        self.failure_reason = None;
        self.state = SessionState::Idle;
        self.buffer = VisibilityBuffer::new(self.overflow_cap);
        self.buffer.set_visible(self.tab_visible, &mut self.window, true);
    }

    fn display(&mut self, comment: Comment, now: Instant) {
        let overlay = (!self.player_paused && self.buffer.is_visible()).then(|| comment.clone());

        let evict = self.follows();
        if let Ingested::Displayed { comment, evicted } = self.buffer.ingest(comment, &mut self.window, evict) {
            self.publish_evicted(evicted);
            self.publish(PanelEvent::CommentsAppended {
                comments: vec![comment],
                backlog: false,
            });
            self.follow_newest(now);
        }

        if let Some(comment) = overlay {
            self.publish(PanelEvent::RenderOverlay { comment });
        }
    }

    fn follows(&self) -> bool {
        self.scroll.mode() == ScrollMode::Auto
    }

    fn follow_newest(&mut self, now: Instant) {
        if self.scroll.begin_programmatic_scroll(now) {
            self.publish(PanelEvent::ScrollToBottom);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.publish(PanelEvent::StateChanged {
            session_id: self.session_id,
            state,
        });
    }

    fn publish_evicted(&mut self, count: usize) {
        if count > 0 {
            self.publish(PanelEvent::CommentsEvicted { count });
        }
    }

    fn publish(&mut self, event: PanelEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
