//! Single owner of the "programmatic scroll in progress" flag.
//!
//! `begin` emits `scroll:autoStart`; `end` only arms a settle deadline so trailing
//! scroll events the host reports after an animation lands are still attributed to it.
//! The deadline is processed by [`ScrollCoordinator::tick`], which is what guarantees
//! every `scroll:autoStart` is eventually followed by exactly one `scroll:autoEnd`.

use crate::{
    bus::{Event, EventBus},
    geometry::LayoutHost,
    tween::{Ease, Tween},
};

/// Who moved the scroll offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ScrollSource {
    User,
    Programmatic,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScrollStats {
    pub starts: u64,
    pub ends: u64,
    pub tweens: u64,
}

#[derive(Debug)]
pub struct ScrollCoordinator {
    auto: bool,
    settle_delay_ms: u64,
    settle_deadline: Option<u64>,
    tween: Option<Tween>,
    now_ms: u64,
    // Offset last written by us outside a tween (eviction compensation).
    expected: Option<f64>,
    stats: ScrollStats,
}

const SAME_OFFSET_EPS: f64 = 0.5;

impl ScrollCoordinator {
    pub fn new(settle_delay_ms: u64) -> Self {
        Self {
            auto: false,
            settle_delay_ms,
            settle_deadline: None,
            tween: None,
            now_ms: 0,
            expected: None,
            stats: ScrollStats::default(),
        }
    }

    pub fn is_auto_scrolling(&self) -> bool {
        self.auto
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn stats(&self) -> ScrollStats {
        self.stats
    }

    pub fn settle_deadline(&self) -> Option<u64> {
        self.settle_deadline
    }

    pub fn target(&self) -> Option<f64> {
        self.tween.map(|t| t.to)
    }

    pub fn begin(&mut self, bus: &mut EventBus) {
        self.settle_deadline = None;
        if self.auto {
            return;
        }
        self.auto = true;
        self.stats.starts += 1;
        tracing::debug!(now_ms = self.now_ms, "auto scroll start");
        bus.emit(Event::ScrollAutoStart);
    }

    /// Arm the settle deadline. The flag stays set until the deadline passes.
    pub fn end(&mut self, bus: &mut EventBus) {
        if !self.auto {
            return;
        }
        if self.settle_delay_ms == 0 {
            self.finish(bus);
            return;
        }
        self.settle_deadline = Some(self.now_ms.saturating_add(self.settle_delay_ms));
    }

    /// Drop the flag immediately and notify `scroll:autoEnd` listeners.
    pub fn finish(&mut self, bus: &mut EventBus) {
        if !self.auto {
            return;
        }
        self.auto = false;
        self.settle_deadline = None;
        self.stats.ends += 1;
        tracing::debug!(now_ms = self.now_ms, "auto scroll end");
        bus.emit(Event::ScrollAutoEnd);
    }

    /// Animate the host's scroll offset to `target`. A scroll already in flight is
    /// retargeted from its current position.
    pub fn scroll_to(
        &mut self,
        target: f64,
        duration_ms: u64,
        ease: Ease,
        host: &dyn LayoutHost,
        bus: &mut EventBus,
    ) {
        if !target.is_finite() {
            tracing::warn!(target, "ignoring non-finite scroll target");
            return;
        }
        match self.tween.as_mut() {
            Some(t) => t.retarget(self.now_ms, target, duration_ms),
            None => {
                self.tween = Some(Tween::new(
                    host.scroll_top(),
                    target,
                    self.now_ms,
                    duration_ms,
                    ease,
                ))
            }
        }
        self.stats.tweens += 1;
        self.begin(bus);
    }

    /// Advance the clock. Returns the new offset when the running tween moved it.
    pub fn tick(
        &mut self,
        now_ms: u64,
        host: &mut dyn LayoutHost,
        bus: &mut EventBus,
    ) -> Option<f64> {
        self.now_ms = self.now_ms.max(now_ms);
        let mut moved = None;
        if let Some(tween) = self.tween {
            let y = tween.sample(self.now_ms);
            host.set_scroll_top(y);
            moved = Some(host.scroll_top());
            if tween.is_done(self.now_ms) {
                self.tween = None;
                self.end(bus);
            }
        }
        if let Some(deadline) = self.settle_deadline
            && self.now_ms >= deadline
        {
            self.finish(bus);
        }
        moved
    }

    /// Remember an offset written directly (not via a tween) so the host's echo of it
    /// is not mistaken for user input.
    pub fn note_programmatic(&mut self, y: f64) {
        self.expected = Some(y);
    }

    pub fn classify(&mut self, y: f64) -> ScrollSource {
        let echoed = self
            .expected
            .take()
            .is_some_and(|e| (e - y).abs() <= SAME_OFFSET_EPS);
        if self.auto || echoed {
            ScrollSource::Programmatic
        } else {
            ScrollSource::User
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{Subscriber, Topic},
        core::BlockIndex,
        geometry::StackLayout,
        model::TemplateBlock,
    };

    fn drained(bus: &mut EventBus) -> Vec<Topic> {
        std::iter::from_fn(|| bus.next_event())
            .map(|e| e.topic())
            .collect()
    }

    fn layout() -> StackLayout {
        let mut s = StackLayout::new(500.0);
        s.mount(BlockIndex(0), &TemplateBlock::new("a", 5_000.0));
        s
    }

    #[test]
    fn end_is_deferred_by_settle_delay() {
        let mut bus = EventBus::new(8);
        let mut host = layout();
        let mut sc = ScrollCoordinator::new(300);
        sc.begin(&mut bus);
        sc.begin(&mut bus);
        assert!(sc.is_auto_scrolling());
        sc.end(&mut bus);
        assert_eq!(sc.settle_deadline(), Some(300));

        sc.tick(299, &mut host, &mut bus);
        assert!(sc.is_auto_scrolling());
        sc.tick(300, &mut host, &mut bus);
        assert!(!sc.is_auto_scrolling());
        assert_eq!(
            drained(&mut bus),
            vec![Topic::ScrollAutoStart, Topic::ScrollAutoEnd]
        );
        assert_eq!(sc.stats().starts, 1);
        assert_eq!(sc.stats().ends, 1);
    }

    #[test]
    fn begin_during_settle_cancels_the_deadline() {
        let mut bus = EventBus::new(8);
        let mut host = layout();
        let mut sc = ScrollCoordinator::new(300);
        sc.begin(&mut bus);
        sc.end(&mut bus);
        sc.begin(&mut bus);
        sc.tick(1_000, &mut host, &mut bus);
        assert!(sc.is_auto_scrolling());
        assert_eq!(drained(&mut bus), vec![Topic::ScrollAutoStart]);
    }

    #[test]
    fn scroll_to_animates_then_settles() {
        let mut bus = EventBus::new(8);
        bus.once(Topic::ScrollAutoEnd, Subscriber::Sequence);
        let mut host = layout();
        let mut sc = ScrollCoordinator::new(300);
        sc.scroll_to(1_000.0, 800, Ease::OutCubic, &host, &mut bus);
        assert_eq!(sc.target(), Some(1_000.0));

        let mid = sc.tick(400, &mut host, &mut bus).unwrap();
        assert!(mid > 500.0 && mid < 1_000.0);
        assert_eq!(sc.classify(mid), ScrollSource::Programmatic);

        assert_eq!(sc.tick(800, &mut host, &mut bus), Some(1_000.0));
        assert_eq!(sc.target(), None);
        assert!(sc.is_auto_scrolling());
        assert_eq!(sc.tick(1_100, &mut host, &mut bus), None);
        assert!(!sc.is_auto_scrolling());
        assert_eq!(
            drained(&mut bus),
            vec![Topic::ScrollAutoStart, Topic::ScrollAutoEnd]
        );
    }

    #[test]
    fn echoed_offsets_are_programmatic_once() {
        let mut sc = ScrollCoordinator::new(0);
        sc.note_programmatic(120.0);
        assert_eq!(sc.classify(120.2), ScrollSource::Programmatic);
        assert_eq!(sc.classify(120.2), ScrollSource::User);
        sc.note_programmatic(10.0);
        assert_eq!(sc.classify(400.0), ScrollSource::User);
    }

    #[test]
    fn zero_delay_ends_immediately() {
        let mut bus = EventBus::new(8);
        let mut sc = ScrollCoordinator::new(0);
        sc.begin(&mut bus);
        sc.end(&mut bus);
        assert!(!sc.is_auto_scrolling());
        sc.finish(&mut bus);
        assert_eq!(sc.stats().ends, 1);
    }
}
