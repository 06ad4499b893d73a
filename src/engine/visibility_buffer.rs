use tracing::warn;

use super::comment::Comment;
use super::retained_window::RetainedWindow;

/// Outcome of handing one comment to the buffer.
#[derive(Debug, PartialEq)]
pub enum Ingested {
    /// Appended to the window straight away.
    Displayed { comment: Comment, evicted: usize },
    /// Held back until the tab becomes visible again.
    Buffered,
}

/// What a hidden → visible transition released into the window.
#[derive(Debug, Default, PartialEq)]
pub struct Flushed {
    pub comments: Vec<Comment>,
    pub evicted: usize,
}

/// Holds comments that arrive while the tab is hidden and releases them,
/// in arrival order, once it is visible again.
#[derive(Debug)]
pub struct VisibilityBuffer {
    visible: bool,
    overflow: Vec<Comment>,
    /// Hard cap on the overflow list; `None` keeps everything.
    overflow_cap: Option<usize>,
    dropped: u64,
}

impl VisibilityBuffer {
    pub fn new(overflow_cap: Option<usize>) -> Self {
        Self {
            visible: true,
            overflow: Vec::new(),
            overflow_cap: overflow_cap.map(|cap| cap.max(1)),
            dropped: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn pending(&self) -> usize {
        self.overflow.len()
    }

    /// Comments discarded because the overflow cap was hit.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Record a visibility change. Becoming visible flushes the overflow list.
    pub fn set_visible(
        &mut self,
        visible: bool,
        window: &mut RetainedWindow,
        evict: bool,
    ) -> Option<Flushed> {
        let was_visible = std::mem::replace(&mut self.visible, visible);
        if !visible || was_visible || self.overflow.is_empty() {
            return None;
        }

        let pending = std::mem::take(&mut self.overflow);
        let (comments, evicted) = window.append(pending, evict);
        Some(Flushed { comments, evicted })
    }

    pub fn ingest(&mut self, comment: Comment, window: &mut RetainedWindow, evict: bool) -> Ingested {
        if self.visible {
            let (mut appended, evicted) = window.append(vec![comment], evict);
            return match appended.pop() {
                Some(comment) => Ingested::Displayed { comment, evicted },
                // Only reachable with a zero-sized window.
                None => Ingested::Buffered,
            };
        }

        if let Some(cap) = self.overflow_cap
            && self.overflow.len() >= cap
        {
            let drop = self.overflow.len() + 1 - cap;
            self.overflow.drain(..drop);
            self.dropped += drop as u64;
            warn!(cap, dropped = self.dropped, "hidden overflow full, dropping oldest comments");
        }
        self.overflow.push(comment);
        Ingested::Buffered
    }

    /// Remove buffered comments that no longer pass `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Comment) -> bool) -> usize {
        let before = self.overflow.len();
        self.overflow.retain(|c| keep(c));
        before - self.overflow.len()
    }

    pub fn clear(&mut self) {
        self.overflow.clear();
    }
}

impl Default for VisibilityBuffer {
    fn default() -> Self {
        Self::new(None)
    }
}
