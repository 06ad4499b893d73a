use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::db::queries::mutes::{load_mute_settings, save_mute_settings};

use super::comment::{Comment, CommentPayload, TargetId};
use super::events::{PanelEvent, SessionState};
use super::mute_filter::{MuteFlags, MuteSettings, MutedKeyword};
use super::scroll_mode::{ScrollMode, ScrollSignal};
use super::session_manager::{SessionHandle, SessionManager};
use super::transport::{CommentTransport, Connection, TransportError};
use super::validation::{SendError, Viewer};

/// Work completed off the owner's task, applied in arrival order.
enum Inbound {
    Connected {
        handle: SessionHandle,
        result: Result<Connection, TransportError>,
    },
    Comment {
        generation: u64,
        comment: Comment,
    },
}

/// The comment panel as the rest of the application sees it.
///
/// Owned by a single task. Transport round trips run in spawned tasks and
/// report back through an inbox that the owner drains with
/// [`CommentPanel::process_next`] or [`CommentPanel::settle`].
pub struct CommentPanel<T: CommentTransport> {
    transport: Arc<T>,
    manager: SessionManager,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    /// When present, mute settings are loaded from and saved to the database.
    db: Option<SqlitePool>,
}

impl<T: CommentTransport> CommentPanel<T> {
    pub fn new(transport: Arc<T>, config: &EngineConfig, db: Option<SqlitePool>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            manager: SessionManager::new(config, MuteSettings::default()),
            inbox_tx,
            inbox_rx,
            db,
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PanelEvent> {
        self.manager.subscribe()
    }

    /// Start the comment feed for `target`, tearing down any previous session first.
    /// Returns as soon as the connect request is in flight.
    pub async fn start_session(&mut self, target: TargetId) -> Result<SessionHandle, String> {
        if self.manager.state() != SessionState::Idle {
            self.manager.destroy();
            self.manager.reset();
        }

        self.reload_mute_settings().await;
        let handle = self.manager.start(target)?;

        let transport = self.transport.clone();
        let inbox = self.inbox_tx.clone();
        let backlog_limit = self.manager.backlog_limit();
        let pending = handle.clone();
        tokio::spawn(async move {
            let result = transport.connect(&pending.target, backlog_limit).await;
            if inbox
                .send(Inbound::Connected {
                    handle: pending,
                    result,
                })
                .is_err()
            {
                debug!("panel dropped before connect completed");
            }
        });

        Ok(handle)
    }

    /// Tear down the current session. Idempotent.
    pub fn destroy_session(&mut self) {
        self.manager.destroy();
    }

    pub async fn send_comment(&mut self, viewer: &Viewer, payload: CommentPayload) -> Result<(), SendError> {
        let handle = self.manager.prepare_send(viewer, &payload)?;

        let outcome = self.transport.post(&handle.target, &payload).await;
        if !outcome.success {
            warn!(session_id = %handle.session_id, message = %outcome.message, "comment post failed");
            return Err(SendError::Transport(outcome.message));
        }

        let comment = Comment::own_post(&payload, viewer.linked_identity.clone());
        self.manager.on_sent(&handle, comment, Instant::now());
        Ok(())
    }

    pub fn display_list(&self) -> Vec<Comment> {
        self.manager.display_list()
    }

    pub fn scroll_mode(&self) -> ScrollMode {
        self.manager.scroll_mode()
    }

    pub fn state(&self) -> SessionState {
        self.manager.state()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.manager.failure_reason()
    }

    pub fn pending_hidden(&self) -> usize {
        self.manager.pending_hidden()
    }

    pub fn set_visibility(&mut self, visible: bool, now: Instant) {
        self.manager.set_visibility(visible, now);
    }

    pub fn set_player_paused(&mut self, paused: bool) {
        self.manager.set_player_paused(paused);
    }

    pub fn on_scroll_signal(&mut self, signal: ScrollSignal, now: Instant) {
        self.manager.on_scroll_signal(signal, now);
    }

    pub fn is_muted(&self, comment: &Comment) -> bool {
        self.manager.is_muted(comment)
    }

    pub fn mute_settings(&self) -> MuteSettings {
        self.manager.mute_settings()
    }

    /// Re-read the persisted mute lists (session start, mute settings screen opened).
    pub async fn reload_mute_settings(&mut self) {
        let Some(pool) = &self.db else {
            return;
        };
        match load_mute_settings(pool).await {
            Ok(settings) => self.manager.replace_mute_settings(settings),
            Err(e) => error!(error = %e, "failed to load mute settings"),
        }
    }

    pub async fn add_muted_keyword(&mut self, keyword: MutedKeyword) -> bool {
        let changed = self.manager.add_muted_keyword(keyword);
        self.save_if(changed).await
    }

    pub async fn edit_muted_keyword(&mut self, index: usize, keyword: MutedKeyword) -> bool {
        let changed = self.manager.edit_muted_keyword(index, keyword);
        self.save_if(changed).await
    }

    pub async fn remove_muted_keyword(&mut self, index: usize) -> bool {
        let changed = self.manager.remove_muted_keyword(index);
        self.save_if(changed).await
    }

    pub async fn add_muted_user_id(&mut self, user_id: String) -> bool {
        let changed = self.manager.add_muted_user_id(user_id);
        self.save_if(changed).await
    }

    pub async fn remove_muted_user_id(&mut self, user_id: &str) -> bool {
        let changed = self.manager.remove_muted_user_id(user_id);
        self.save_if(changed).await
    }

    /// "Mute this user" from a comment's context menu.
    pub async fn mute_author_of(&mut self, comment: &Comment) -> bool {
        let changed = self.manager.mute_author_of(comment);
        self.save_if(changed).await
    }

    pub async fn set_mute_flags(&mut self, flags: MuteFlags) -> bool {
        let changed = self.manager.set_mute_flags(flags);
        self.save_if(changed).await
    }

    /// Remove already displayed comments that the current mute rules reject.
    pub fn refilter(&mut self) -> usize {
        self.manager.refilter()
    }

    /// Wait for the next piece of transport work and apply it.
    /// Returns false once no more work can arrive.
    pub async fn process_next(&mut self) -> bool {
        match self.inbox_rx.recv().await {
            Some(inbound) => {
                self.apply(inbound);
                true
            }
            None => false,
        }
    }

    /// Apply everything already waiting in the inbox without blocking.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(inbound) = self.inbox_rx.try_recv() {
            self.apply(inbound);
            applied += 1;
        }
        applied
    }

    /// Keep applying inbound work until nothing arrives for `quiet`.
    pub async fn settle(&mut self, quiet: Duration) -> usize {
        let mut applied = 0;
        while let Ok(Some(inbound)) = tokio::time::timeout(quiet, self.inbox_rx.recv()).await {
            self.apply(inbound);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Connected { handle, result } => {
                let token = result.as_ref().ok().map(|c| c.subscription.token());
                if let Some(feed) = self.manager.on_connected(&handle, result, Instant::now())
                    && let Some(token) = token
                {
                    self.forward_feed(handle.generation, feed, token);
                }
            }
            Inbound::Comment {
                generation,
                comment,
            } => {
                self.manager
                    .on_comment_received(generation, comment, Instant::now());
            }
        }
    }

    /// Pump the live feed into the inbox until the subscription is cancelled.
    fn forward_feed(
        &self,
        generation: u64,
        mut feed: mpsc::UnboundedReceiver<Comment>,
        token: CancellationToken,
    ) {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = feed.recv() => match next {
                        Some(comment) => {
                            if inbox.send(Inbound::Comment { generation, comment }).is_err() {
                                break;
                            }
                        }
                        None => {
                            info!(generation, "comment feed closed by transport");
                            break;
                        }
                    },
                }
            }
        });
    }

    async fn save_if(&self, changed: bool) -> bool {
        if changed
            && let Some(pool) = &self.db
            && let Err(e) = save_mute_settings(pool, &self.manager.mute_settings()).await
        {
            error!(error = %e, "failed to persist mute settings");
        }
        changed
    }
}
