use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::comment::{Comment, CommentPayload, TargetId};

/// Handle to a live feed. Dropping it does not unsubscribe; call
/// [`Subscription::unsubscribe`] explicitly.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Token the transport watches to stop producing comments.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A freshly opened comment feed.
#[derive(Debug)]
pub struct Connection {
    /// Prior comments, oldest first.
    pub backlog: Vec<Comment>,
    /// Live comments in arrival order.
    pub feed: mpsc::UnboundedReceiver<Comment>,
    pub subscription: Subscription,
}

/// Result of posting a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOutcome {
    pub success: bool,
    pub message: String,
}

impl PostOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No comment feed exists for the target.
    Unavailable(String),
    /// The feed could not be reached or dropped during setup.
    Connect(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unavailable(msg) => write!(f, "comments are not available: {}", msg),
            TransportError::Connect(msg) => write!(f, "failed to connect to the comment server: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// The remote comment service. Implementations own the wire protocol.
pub trait CommentTransport: Send + Sync + 'static {
    /// Fetch up to `backlog_limit` prior comments and open a live feed for `target`.
    fn connect(
        &self,
        target: &TargetId,
        backlog_limit: usize,
    ) -> impl Future<Output = Result<Connection, TransportError>> + Send;

    fn post(
        &self,
        target: &TargetId,
        payload: &CommentPayload,
    ) -> impl Future<Output = PostOutcome> + Send;
}
