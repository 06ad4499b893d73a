use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Identifier of a playback target (a live channel or a recorded program).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the overlay renderer places a comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    Scroll,
    Top,
    Bottom,
}

impl Position {
    /// Top and bottom comments stay fixed on screen instead of scrolling.
    pub fn is_fixed(self) -> bool {
        matches!(self, Position::Top | Position::Bottom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Size {
    Small,
    #[default]
    Medium,
    Big,
}

pub const DEFAULT_COLOR: &str = "#FFFFFF";

/// Presentation attributes attached to a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentStyle {
    pub position: Position,
    pub size: Size,
    /// `#RRGGBB`.
    pub color: String,
}

impl Default for CommentStyle {
    fn default() -> Self {
        Self {
            position: Position::Scroll,
            size: Size::Medium,
            color: DEFAULT_COLOR.to_string(),
        }
    }
}

impl CommentStyle {
    pub fn is_colored(&self) -> bool {
        !self.color.eq_ignore_ascii_case(DEFAULT_COLOR)
    }
}

/// A single received comment. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    /// Display-formatted timestamp.
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub my_post: bool,
    #[serde(default)]
    pub style: CommentStyle,
}

impl Comment {
    pub fn new(text: impl Into<String>, time: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            time: time.into(),
            user_id,
            my_post: false,
            style: CommentStyle::default(),
        }
    }

    /// Build the optimistic local copy of a comment the viewer just posted.
    pub fn own_post(payload: &CommentPayload, user_id: Option<String>) -> Self {
        Self {
            text: payload.text.clone(),
            time: Local::now().format("%H:%M:%S").to_string(),
            user_id,
            my_post: true,
            style: payload.style.clone(),
        }
    }

    pub fn with_style(mut self, style: CommentStyle) -> Self {
        self.style = style;
        self
    }
}

/// An outgoing comment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPayload {
    pub text: String,
    #[serde(default)]
    pub style: CommentStyle,
}

impl CommentPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: CommentStyle::default(),
        }
    }

    /// Whether the payload asks for a presentation reserved to the premium tier.
    pub fn needs_premium(&self) -> bool {
        self.style.position.is_fixed() || self.style.size == Size::Big
    }
}
