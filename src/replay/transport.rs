use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::comment::{Comment, CommentPayload, TargetId};
use crate::engine::transport::{CommentTransport, Connection, PostOutcome, Subscription, TransportError};

struct LiveFeed {
    target: TargetId,
    tx: mpsc::UnboundedSender<Comment>,
    token: CancellationToken,
}

/// In-process transport driven by a replay script.
#[derive(Default)]
pub struct ReplayTransport {
    backlogs: Mutex<HashMap<TargetId, Vec<Comment>>>,
    failures: Mutex<HashMap<TargetId, String>>,
    live: Mutex<Option<LiveFeed>>,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_backlog(&self, target: TargetId, comments: Vec<Comment>) {
        self.backlogs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(target, comments);
    }

    pub fn fail_target(&self, target: TargetId, reason: String) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(target, reason);
    }

    /// Deliver a live comment on the most recently opened feed.
    /// Returns false if no feed is open.
    pub fn push(&self, comment: Comment) -> bool {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        match live.as_ref() {
            Some(feed) if !feed.token.is_cancelled() => feed.tx.send(comment).is_ok(),
            _ => false,
        }
    }
}

impl CommentTransport for ReplayTransport {
    async fn connect(&self, target: &TargetId, backlog_limit: usize) -> Result<Connection, TransportError> {
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(target)
            .cloned();
        if let Some(reason) = failure {
            return Err(TransportError::Unavailable(reason));
        }

        let mut backlog = self
            .backlogs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(target)
            .cloned()
            .unwrap_or_default();
        if backlog.len() > backlog_limit {
            backlog.drain(..backlog.len() - backlog_limit);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        *self.live.lock().unwrap_or_else(|e| e.into_inner()) = Some(LiveFeed {
            target: target.clone(),
            tx,
            token: token.clone(),
        });
        debug!(%target, backlog = backlog.len(), "replay feed opened");

        Ok(Connection {
            backlog,
            feed: rx,
            subscription: Subscription::new(token),
        })
    }

    async fn post(&self, target: &TargetId, _payload: &CommentPayload) -> PostOutcome {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        match live.as_ref() {
            Some(feed) if &feed.target == target && !feed.token.is_cancelled() => PostOutcome::ok(),
            _ => PostOutcome::failed("not connected"),
        }
    }
}
