use std::collections::VecDeque;

use super::comment::Comment;

/// Default number of comments kept for display.
pub const DEFAULT_RETAINED_LIMIT: usize = 500;

/// The ordered, bounded list of comments currently eligible for display.
/// Appends go to the tail, eviction removes from the head.
#[derive(Debug)]
pub struct RetainedWindow {
    comments: VecDeque<Comment>,
    limit: usize,
}

impl RetainedWindow {
    pub fn new(limit: usize) -> Self {
        Self {
            comments: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Append a batch, making room first so that the newest `limit` comments
    /// (existing + incoming) survive. With `evict == false` nothing is dropped.
    ///
    /// Returns the comments actually appended and how many existing ones were evicted.
    pub fn append(&mut self, mut incoming: Vec<Comment>, evict: bool) -> (Vec<Comment>, usize) {
        if !evict {
            self.comments.extend(incoming.iter().cloned());
            return (incoming, 0);
        }

        let excess = (self.comments.len() + incoming.len()).saturating_sub(self.limit);
        let from_window = excess.min(self.comments.len());
        self.comments.drain(..from_window);

        // Whatever excess remains is older incoming comments that would be
        // evicted immediately anyway.
        let skip = excess - from_window;
        incoming.drain(..skip);

        self.comments.extend(incoming.iter().cloned());
        (incoming, from_window)
    }

    /// Trim the head back down to the limit. Returns the number evicted.
    pub fn enforce_limit(&mut self) -> usize {
        let excess = self.comments.len().saturating_sub(self.limit);
        self.comments.drain(..excess);
        excess
    }

    /// Keep only comments for which `keep` returns true. Returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Comment) -> bool) -> usize {
        let before = self.comments.len();
        self.comments.retain(|c| keep(c));
        before - self.comments.len()
    }

    pub fn snapshot(&self) -> Vec<Comment> {
        self.comments.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter()
    }

    pub fn clear(&mut self) {
        self.comments.clear();
    }
}

impl Default for RetainedWindow {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(range: std::ops::RangeInclusive<usize>) -> Vec<Comment> {
        range
            .map(|i| Comment::new(i.to_string(), "00:00:00", None))
            .collect()
    }

    fn texts(window: &RetainedWindow) -> Vec<String> {
        window.iter().map(|c| c.text.clone()).collect()
    }

    #[test]
    fn test_append_under_limit() {
        let mut window = RetainedWindow::new(5);
        let (appended, evicted) = window.append(numbered(1..=3), true);
        assert_eq!(appended.len(), 3);
        assert_eq!(evicted, 0);
        assert_eq!(texts(&window), ["1", "2", "3"]);
    }

    #[test]
    fn test_append_evicts_oldest() {
        let mut window = RetainedWindow::new(5);
        window.append(numbered(1..=4), true);
        let (appended, evicted) = window.append(numbered(5..=7), true);
        assert_eq!(evicted, 2);
        assert_eq!(appended.len(), 3);
        assert_eq!(texts(&window), ["3", "4", "5", "6", "7"]);
    }

    #[test]
    fn test_oversized_batch_keeps_newest() {
        let mut window = RetainedWindow::new(500);
        window.append(numbered(1..=10), true);
        let (appended, evicted) = window.append(numbered(11..=610), true);
        assert_eq!(evicted, 10);
        assert_eq!(appended.len(), 500);
        assert_eq!(window.len(), 500);
        assert_eq!(window.iter().next().unwrap().text, "111");
        assert_eq!(window.iter().last().unwrap().text, "610");
    }

    #[test]
    fn test_no_evict_then_enforce() {
        let mut window = RetainedWindow::new(3);
        window.append(numbered(1..=5), false);
        assert_eq!(window.len(), 5);
        assert_eq!(window.enforce_limit(), 2);
        assert_eq!(texts(&window), ["3", "4", "5"]);
        assert_eq!(window.enforce_limit(), 0);
    }

    #[test]
    fn test_retain_counts_removed() {
        let mut window = RetainedWindow::new(10);
        window.append(numbered(1..=6), true);
        let removed = window.retain(|c| c.text.parse::<usize>().unwrap() % 2 == 0);
        assert_eq!(removed, 3);
        assert_eq!(texts(&window), ["2", "4", "6"]);
    }
}
