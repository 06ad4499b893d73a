use std::fmt;

use serde::{Deserialize, Serialize};

use super::comment::CommentPayload;

/// Default maximum comment length, in characters.
pub const DEFAULT_MAX_COMMENT_LENGTH: usize = 75;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeTier {
    #[default]
    Standard,
    /// Allowed to post fixed-position and big comments.
    Premium,
}

/// Who is trying to post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewer {
    pub logged_in: bool,
    /// Identifier of the linked posting account, if any.
    pub linked_identity: Option<String>,
    pub tier: PrivilegeTier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    NoActiveSession,
    EmptyComment,
    CommentTooLong { max: usize },
    NotLoggedIn,
    IdentityNotLinked,
    PremiumRequired,
    /// The transport rejected or failed to deliver the comment.
    Transport(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NoActiveSession => write!(f, "comments are not connected"),
            SendError::EmptyComment => write!(f, "comment is empty"),
            SendError::CommentTooLong { max } => {
                write!(f, "comment is longer than {} characters", max)
            }
            SendError::NotLoggedIn => write!(f, "log in to post comments"),
            SendError::IdentityNotLinked => {
                write!(f, "link a posting account to post comments")
            }
            SendError::PremiumRequired => {
                write!(f, "fixed-position and big comments require a premium account")
            }
            SendError::Transport(msg) if msg.is_empty() => write!(f, "failed to send comment"),
            SendError::Transport(msg) => write!(f, "failed to send comment: {}", msg),
        }
    }
}

impl std::error::Error for SendError {}

/// Check everything about a send that doesn't need the network.
/// Session state is checked by the caller.
pub fn validate_send(
    viewer: &Viewer,
    payload: &CommentPayload,
    max_length: usize,
) -> Result<(), SendError> {
    if payload.text.trim().is_empty() {
        return Err(SendError::EmptyComment);
    }
    if payload.text.chars().count() > max_length {
        return Err(SendError::CommentTooLong { max: max_length });
    }
    if !viewer.logged_in {
        return Err(SendError::NotLoggedIn);
    }
    if viewer.linked_identity.as_deref().is_none_or(str::is_empty) {
        return Err(SendError::IdentityNotLinked);
    }
    if payload.needs_premium() && viewer.tier != PrivilegeTier::Premium {
        return Err(SendError::PremiumRequired);
    }
    Ok(())
}
