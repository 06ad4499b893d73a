//! Auto-follow detection for the comment list.
//!
//! User scrolling and programmatic scrolling produce the same "scroll position
//! changed" signal, so the detector tracks where recent input came from:
//!   - wheel, touch drag and scrollbar drag open a short "user is scrolling" window
//!   - a programmatic scroll-to-bottom opens a "programmatic" window
//!
//! A user scroll that settles away from the bottom switches to manual mode; one
//! that settles within the threshold stays in, or returns to, auto mode.
//!
//! Every input carries an explicit `Instant` so the debounce can be driven
//! deterministically in tests.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_BOTTOM_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollMode {
    /// Follow new comments to the bottom of the list.
    #[default]
    Auto,
    /// User is reading history; leave the scroll position alone.
    Manual,
}

/// Scroll geometry of the list at the time of a scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    /// Distance scrolled from the top.
    pub offset: f64,
    pub content_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.content_height - self.viewport_height - self.offset).max(0.0)
    }
}

/// Raw interaction signals observed on the comment list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrollSignal {
    Wheel,
    /// `x` is relative to the list; presses past `content_width` hit the scrollbar.
    PointerDown { x: f64, content_width: f64 },
    PointerMove,
    PointerUp,
    Scroll(ScrollMetrics),
    /// The contextual menu over a comment was opened.
    DropdownOpened,
    /// Explicit "back to latest" request.
    JumpToLatest,
}

/// What the list should do in response to a signal.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScrollReaction {
    pub mode_changed: Option<ScrollMode>,
    pub scroll_to_bottom: bool,
}

#[derive(Debug)]
pub struct ScrollModeDetector {
    mode: ScrollMode,
    debounce: Duration,
    bottom_threshold: f64,
    user_scroll_until: Option<Instant>,
    programmatic_until: Option<Instant>,
    pointer_down: bool,
    scrollbar_drag: bool,
}

impl ScrollModeDetector {
    pub fn new(debounce: Duration, bottom_threshold: f64) -> Self {
        Self {
            mode: ScrollMode::Auto,
            debounce,
            bottom_threshold,
            user_scroll_until: None,
            programmatic_until: None,
            pointer_down: false,
            scrollbar_drag: false,
        }
    }

    pub fn mode(&self) -> ScrollMode {
        self.mode
    }

    pub fn is_user_scrolling(&self, now: Instant) -> bool {
        self.scrollbar_drag || self.user_scroll_until.is_some_and(|until| now < until)
    }

    pub fn is_programmatic_scroll(&self, now: Instant) -> bool {
        self.programmatic_until.is_some_and(|until| now < until)
    }

    pub fn handle(&mut self, signal: ScrollSignal, now: Instant) -> ScrollReaction {
        match signal {
            ScrollSignal::Wheel => {
                self.mark_user_scroll(now);
                ScrollReaction::default()
            }
            ScrollSignal::PointerDown { x, content_width } => {
                self.pointer_down = true;
                if x > content_width {
                    self.scrollbar_drag = true;
                    self.mark_user_scroll(now);
                }
                ScrollReaction::default()
            }
            ScrollSignal::PointerMove => {
                if self.pointer_down {
                    self.mark_user_scroll(now);
                }
                ScrollReaction::default()
            }
            ScrollSignal::PointerUp => {
                if self.scrollbar_drag {
                    // The scroll event for the final drag position may land after release.
                    self.mark_user_scroll(now);
                }
                self.pointer_down = false;
                self.scrollbar_drag = false;
                ScrollReaction::default()
            }
            ScrollSignal::Scroll(metrics) => ScrollReaction {
                mode_changed: self.on_scroll(metrics, now),
                scroll_to_bottom: false,
            },
            ScrollSignal::DropdownOpened => ScrollReaction {
                mode_changed: self.set_mode(ScrollMode::Manual),
                scroll_to_bottom: false,
            },
            ScrollSignal::JumpToLatest => {
                let mode_changed = self.set_mode(ScrollMode::Auto);
                ScrollReaction {
                    mode_changed,
                    scroll_to_bottom: self.begin_programmatic_scroll(now),
                }
            }
        }
    }

    /// A new comment was displayed. Returns true if the list should be scrolled
    /// to the bottom; that scroll is then treated as programmatic.
    pub fn begin_programmatic_scroll(&mut self, now: Instant) -> bool {
        if self.mode != ScrollMode::Auto {
            return false;
        }
        self.programmatic_until = Some(now + self.debounce);
        true
    }

    /// Back to the initial state, used when the list is torn down.
    pub fn reset(&mut self) {
        *self = Self::new(self.debounce, self.bottom_threshold);
    }

    fn on_scroll(&mut self, metrics: ScrollMetrics, now: Instant) -> Option<ScrollMode> {
        if !self.is_user_scrolling(now) {
            return None;
        }

        // Programmatic scrolls always land at the bottom, so a position away
        // from it is the user's even while a programmatic window is open.
        if metrics.distance_from_bottom() > self.bottom_threshold {
            return self.set_mode(ScrollMode::Manual);
        }
        if self.is_programmatic_scroll(now) {
            return None;
        }
        self.set_mode(ScrollMode::Auto)
    }

    fn mark_user_scroll(&mut self, now: Instant) {
        self.user_scroll_until = Some(now + self.debounce);
    }

    fn set_mode(&mut self, mode: ScrollMode) -> Option<ScrollMode> {
        if self.mode == mode {
            return None;
        }
        self.mode = mode;
        Some(mode)
    }
}

impl Default for ScrollModeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_BOTTOM_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(offset: f64) -> ScrollSignal {
        ScrollSignal::Scroll(ScrollMetrics {
            offset,
            content_height: 2000.0,
            viewport_height: 400.0,
        })
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_distance_from_bottom() {
        let m = ScrollMetrics {
            offset: 1595.0,
            content_height: 2000.0,
            viewport_height: 400.0,
        };
        assert_eq!(m.distance_from_bottom(), 5.0);
    }

    #[test]
    fn test_wheel_then_scroll_goes_manual_and_back() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();

        detector.handle(ScrollSignal::Wheel, t0);
        let reaction = detector.handle(metrics(800.0), ms(t0, 20));
        assert_eq!(reaction.mode_changed, Some(ScrollMode::Manual));
        assert_eq!(detector.mode(), ScrollMode::Manual);

        // Scroll further without reaching the bottom: stays manual.
        detector.handle(ScrollSignal::Wheel, ms(t0, 500));
        assert_eq!(detector.handle(metrics(1200.0), ms(t0, 520)).mode_changed, None);

        // Back within 10px of the bottom.
        detector.handle(ScrollSignal::Wheel, ms(t0, 900));
        let reaction = detector.handle(metrics(1592.0), ms(t0, 920));
        assert_eq!(reaction.mode_changed, Some(ScrollMode::Auto));
    }

    #[test]
    fn test_scroll_without_user_input_is_ignored() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        assert_eq!(detector.handle(metrics(100.0), t0).mode_changed, None);

        // Debounce window expired.
        detector.handle(ScrollSignal::Wheel, t0);
        assert_eq!(detector.handle(metrics(100.0), ms(t0, 150)).mode_changed, None);
        assert_eq!(detector.mode(), ScrollMode::Auto);
    }

    #[test]
    fn test_programmatic_scroll_never_goes_manual() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        assert!(detector.begin_programmatic_scroll(t0));
        detector.handle(ScrollSignal::Wheel, ms(t0, 10));
        assert_eq!(detector.handle(metrics(1600.0), ms(t0, 20)).mode_changed, None);
        assert_eq!(detector.mode(), ScrollMode::Auto);
    }

    #[test]
    fn test_touch_drag_only_counts_while_pressed() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();

        detector.handle(ScrollSignal::PointerMove, t0);
        assert_eq!(detector.handle(metrics(300.0), ms(t0, 10)).mode_changed, None);

        detector.handle(ScrollSignal::PointerDown { x: 50.0, content_width: 300.0 }, ms(t0, 200));
        assert!(!detector.is_user_scrolling(ms(t0, 200)));
        detector.handle(ScrollSignal::PointerMove, ms(t0, 210));
        assert_eq!(
            detector.handle(metrics(300.0), ms(t0, 220)).mode_changed,
            Some(ScrollMode::Manual)
        );
    }

    #[test]
    fn test_scrollbar_drag_holds_until_release() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();

        detector.handle(ScrollSignal::PointerDown { x: 305.0, content_width: 300.0 }, t0);
        // Long after the debounce window, still dragging.
        assert!(detector.is_user_scrolling(ms(t0, 5_000)));
        assert_eq!(
            detector.handle(metrics(300.0), ms(t0, 5_000)).mode_changed,
            Some(ScrollMode::Manual)
        );

        detector.handle(ScrollSignal::PointerUp, ms(t0, 6_000));
        assert!(detector.is_user_scrolling(ms(t0, 6_050)));
        assert!(!detector.is_user_scrolling(ms(t0, 6_200)));
    }

    #[test]
    fn test_dropdown_forces_manual_and_suppresses_follow() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        let reaction = detector.handle(ScrollSignal::DropdownOpened, t0);
        assert_eq!(reaction.mode_changed, Some(ScrollMode::Manual));
        assert!(!detector.begin_programmatic_scroll(t0));
    }

    #[test]
    fn test_jump_to_latest() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        detector.handle(ScrollSignal::DropdownOpened, t0);
        let reaction = detector.handle(ScrollSignal::JumpToLatest, ms(t0, 10));
        assert_eq!(reaction.mode_changed, Some(ScrollMode::Auto));
        assert!(reaction.scroll_to_bottom);
        assert!(detector.is_programmatic_scroll(ms(t0, 50)));
    }

    #[test]
    fn test_user_scroll_wins_over_busy_feed() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        // A steady feed keeps re-opening the programmatic window.
        for tick in 0..20 {
            assert!(detector.begin_programmatic_scroll(ms(t0, tick * 50)));
        }
        assert!(detector.is_programmatic_scroll(ms(t0, 960)));

        detector.handle(ScrollSignal::Wheel, ms(t0, 960));
        let reaction = detector.handle(metrics(200.0), ms(t0, 970));
        assert_eq!(reaction.mode_changed, Some(ScrollMode::Manual));
        assert_eq!(detector.mode(), ScrollMode::Manual);
    }

    #[test]
    fn test_programmatic_landing_does_not_undo_dropdown() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        detector.begin_programmatic_scroll(t0);
        detector.handle(ScrollSignal::DropdownOpened, ms(t0, 5));
        detector.handle(ScrollSignal::Wheel, ms(t0, 10));
        assert_eq!(detector.handle(metrics(1600.0), ms(t0, 20)).mode_changed, None);
        assert_eq!(detector.mode(), ScrollMode::Manual);
    }

    #[test]
    fn test_short_drag_settling_at_bottom_stays_auto() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        detector.handle(ScrollSignal::PointerDown { x: 50.0, content_width: 300.0 }, t0);
        detector.handle(ScrollSignal::PointerMove, ms(t0, 10));
        // 3px from the bottom.
        assert_eq!(detector.handle(metrics(1597.0), ms(t0, 20)).mode_changed, None);
        detector.handle(ScrollSignal::PointerUp, ms(t0, 30));
        assert_eq!(detector.mode(), ScrollMode::Auto);
    }

    #[test]
    fn test_scrollbar_release_at_bottom_returns_to_auto() {
        let t0 = Instant::now();
        let mut detector = ScrollModeDetector::default();
        detector.handle(ScrollSignal::PointerDown { x: 305.0, content_width: 300.0 }, t0);
        assert_eq!(
            detector.handle(metrics(900.0), ms(t0, 10)).mode_changed,
            Some(ScrollMode::Manual)
        );
        assert_eq!(
            detector.handle(metrics(1595.0), ms(t0, 20)).mode_changed,
            Some(ScrollMode::Auto)
        );
        detector.handle(ScrollSignal::PointerUp, ms(t0, 30));
        assert_eq!(detector.mode(), ScrollMode::Auto);
    }
}
