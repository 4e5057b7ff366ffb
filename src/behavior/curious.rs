use super::{Behavior, BlockInfo, Lifecycle, sync_scene};
use crate::{
    bus::{Event, Subscriber, SubscriptionId, Topic},
    core::ScrollDirection,
    cx::Cx,
    geometry::{VisualEffect, measure},
    scene::{SceneEvent, SceneEventKind, SceneId, SceneSpec},
};

/// Title pinned while the previous block scrolls through.
///
/// The first time the title pins, ball one is cloned onto this block's surface and a
/// versioned `block:leave` subscription is taken. Leaving the block forward then drops
/// the clone, once.
#[derive(Debug, Default)]
pub struct Curious {
    attached: bool,
    cloned: bool,
    dropped: bool,
    leave_sub: Option<SubscriptionId>,
    title_scene: Option<SceneId>,
}

impl Curious {
    pub fn title_scene(&self) -> Option<SceneId> {
        self.title_scene
    }

    pub fn is_listening(&self) -> bool {
        self.leave_sub.is_some()
    }

    fn title_spec(block: &BlockInfo, cx: &Cx<'_>) -> Option<SceneSpec> {
        let prev = block.previous?;
        match measure(&*cx.host, prev) {
            Ok(m) => Some(SceneSpec::new(m.top, m.height, 0.0)),
            Err(e) => {
                tracing::debug!(block = block.index.0, error = %e, "curious title scene deferred");
                None
            }
        }
    }

    fn sync(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        let spec = Self::title_spec(block, cx);
        sync_scene(&mut self.title_scene, spec, block, cx);
    }

    fn listen(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if self.leave_sub.is_none() && !self.dropped {
            self.leave_sub = Some(
                cx.bus
                    .on_versioned(Topic::BlockLeave, Subscriber::Block(block.index)),
            );
        }
    }

    fn stop_listening(&mut self, cx: &mut Cx<'_>) {
        if let Some(id) = self.leave_sub.take() {
            cx.bus.off(id);
        }
    }
}

impl Lifecycle for Curious {
    fn attach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.attached = true;
        self.sync(block, cx);
    }

    fn detach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.stop_listening(cx);
        if let Some(id) = self.title_scene.take() {
            cx.scenes.destroy(id);
            cx.host.apply(block.index, VisualEffect::TitleFixed(false));
        }
        self.attached = false;
    }

    fn reset(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if !self.attached {
            self.attach(block, cx);
            return;
        }
        // The versioned subscription lapsed with the old generation.
        if self.leave_sub.is_some() {
            self.stop_listening(cx);
            self.listen(block, cx);
        }
        self.sync(block, cx);
    }
}

impl Behavior for Curious {
    fn name(&self) -> &'static str {
        "curious"
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn on_event(&mut self, block: &BlockInfo, cx: &mut Cx<'_>, event: &Event) {
        let Event::BlockLeave { index, direction } = event else {
            return;
        };
        if *index != block.index
            || *direction != ScrollDirection::Forward
            || !self.cloned
            || self.dropped
        {
            return;
        }
        cx.balls.drop_clone(block.index);
        self.dropped = true;
        self.stop_listening(cx);
    }

    fn on_scene(&mut self, block: &BlockInfo, cx: &mut Cx<'_>, event: &SceneEvent) {
        if Some(event.scene) != self.title_scene {
            return;
        }
        match event.kind {
            SceneEventKind::Enter => {
                cx.host.apply(block.index, VisualEffect::TitleFixed(true));
                self.listen(block, cx);
                if !self.cloned {
                    cx.balls.clone_one(block.index);
                    self.cloned = true;
                }
            }
            SceneEventKind::Leave => cx.host.apply(block.index, VisualEffect::TitleFixed(false)),
            SceneEventKind::Progress(_) => {}
        }
    }

    fn refresh(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if self.attached {
            self.sync(block, cx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{behavior::BallClone, core::BlockIndex, cx::harness::Harness};

    fn info() -> BlockInfo {
        BlockInfo {
            index: BlockIndex(1),
            copy: 0,
            previous: Some(BlockIndex(0)),
        }
    }

    fn leave(direction: ScrollDirection) -> Event {
        Event::BlockLeave {
            index: BlockIndex(1),
            direction,
        }
    }

    fn scroll(h: &mut Harness, c: &mut Curious, b: &BlockInfo, y: f64) {
        for ev in h.scenes.update(y) {
            c.on_scene(b, &mut h.cx(), &ev);
        }
    }

    #[test]
    fn pinning_the_title_clones_ball_one_once() {
        let mut h = Harness::with_blocks(400.0, &[600.0, 600.0]);
        let mut c = Curious::default();
        let b = info();
        c.attach(&b, &mut h.cx());
        let spec = h.scenes.spec(c.title_scene().unwrap()).unwrap();
        assert_eq!((spec.top, spec.duration), (0.0, 600.0));
        assert!(!c.is_listening());

        scroll(&mut h, &mut c, &b, 100.0);
        assert!(h.host.style(BlockIndex(1)).unwrap().title_fixed);
        assert_eq!(h.balls.clone_state(), BallClone::Attached(BlockIndex(1)));
        assert_eq!(h.bus.count_for(Subscriber::Block(BlockIndex(1))), 1);

        scroll(&mut h, &mut c, &b, 700.0);
        assert!(!h.host.style(BlockIndex(1)).unwrap().title_fixed);
        scroll(&mut h, &mut c, &b, 300.0);
        assert_eq!(h.bus.count_for(Subscriber::Block(BlockIndex(1))), 1);
    }

    #[test]
    fn clone_drops_on_forward_leave_only() {
        let mut h = Harness::with_blocks(400.0, &[600.0, 600.0]);
        let mut c = Curious::default();
        let b = info();
        c.attach(&b, &mut h.cx());

        // Nothing to drop before the clone exists.
        c.on_event(&b, &mut h.cx(), &leave(ScrollDirection::Forward));
        assert_eq!(h.balls.clone_state(), BallClone::Absent);

        scroll(&mut h, &mut c, &b, 100.0);
        c.on_event(&b, &mut h.cx(), &leave(ScrollDirection::Reverse));
        assert_eq!(h.balls.clone_state(), BallClone::Attached(BlockIndex(1)));

        c.on_event(&b, &mut h.cx(), &leave(ScrollDirection::Forward));
        assert_eq!(h.balls.clone_state(), BallClone::Removed(BlockIndex(1)));
        assert!(!c.is_listening());
        assert_eq!(h.bus.count_for(Subscriber::Block(BlockIndex(1))), 0);

        // Pinning again neither re-clones nor re-subscribes.
        scroll(&mut h, &mut c, &b, 700.0);
        scroll(&mut h, &mut c, &b, 100.0);
        assert_eq!(h.balls.clone_state(), BallClone::Removed(BlockIndex(1)));
        assert!(!c.is_listening());
    }

    #[test]
    fn reset_keeps_pin_and_renews_subscription() {
        let mut h = Harness::with_blocks(400.0, &[600.0, 600.0]);
        let mut c = Curious::default();
        let b = info();
        c.attach(&b, &mut h.cx());
        scroll(&mut h, &mut c, &b, 100.0);
        h.bus.advance_generation();
        h.bus.compact();
        assert_eq!(h.bus.count_topic(Topic::BlockLeave), 0);

        c.reset(&b, &mut h.cx());
        assert!(h.host.style(BlockIndex(1)).unwrap().title_fixed);
        assert_eq!(h.bus.count_topic(Topic::BlockLeave), 1);

        c.destroy(&b, &mut h.cx());
        assert_eq!(h.bus.active_count(), 0);
        assert_eq!(h.scenes.live_count(), 0);
    }
}
