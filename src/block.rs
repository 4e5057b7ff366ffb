use crate::{
    behavior::{self, Behavior, BlockInfo},
    bus::{Event, Subscriber, SubscriptionId, Topic},
    core::{Background, BlockIndex, ScrollDirection},
    cx::Cx,
    error::{LoopError, LoopResult},
    geometry::{VisualEffect, measure},
    model::TemplateBlock,
    scene::{SceneEvent, SceneEventKind, SceneId, SceneOwner, SceneRole, SceneSpec},
};

/// `Created -> Bound -> (Entered <-> Left)* -> Destroyed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum BlockState {
    Created,
    Bound,
    Entered,
    Left,
    Destroyed,
}

/// Background of a block given its predecessor's.
pub fn background_after(previous: Option<Background>, first: bool, repeat: bool) -> Background {
    match previous {
        None => Background::White,
        Some(_) if first => Background::White,
        Some(prev) if repeat => prev,
        Some(prev) => prev.flip(),
    }
}

#[derive(Debug)]
pub struct ContentBlock {
    info: BlockInfo,
    slot: usize,
    name: String,
    first: bool,
    repeat_background: bool,
    is_last: bool,
    background: Option<Background>,
    state: BlockState,
    trigger: Option<SceneId>,
    behaviors: Vec<Box<dyn Behavior>>,
    reset_sub: Option<SubscriptionId>,
}

impl ContentBlock {
    pub fn new(index: BlockIndex, template: &TemplateBlock, template_len: usize) -> Self {
        Self {
            info: BlockInfo {
                index,
                copy: index.copy(template_len),
                previous: None,
            },
            slot: index.slot(template_len),
            name: template.name.clone(),
            first: template.first,
            repeat_background: template.repeat_background,
            is_last: false,
            background: None,
            state: BlockState::Created,
            trigger: None,
            behaviors: behavior::build_all(template),
            reset_sub: None,
        }
    }

    pub fn index(&self) -> BlockIndex {
        self.info.index
    }

    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    pub fn set_last(&mut self, is_last: bool) {
        self.is_last = is_last;
    }

    pub fn background(&self) -> Option<Background> {
        self.background
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == BlockState::Destroyed
    }

    pub fn trigger(&self) -> Option<SceneId> {
        self.trigger
    }

    pub fn behaviors(&self) -> impl Iterator<Item = &dyn Behavior> {
        self.behaviors.iter().map(|b| b.as_ref())
    }

    pub fn set_previous(&mut self, previous: Option<BlockIndex>) {
        self.info.previous = previous;
    }

    /// Decided once, from the block immediately before this one at assignment time.
    pub fn assign_background(
        &mut self,
        previous: Option<Background>,
        cx: &mut Cx<'_>,
    ) -> Background {
        let bg = background_after(previous, self.first, self.repeat_background);
        self.background = Some(bg);
        cx.host.apply(self.info.index, VisualEffect::Background(bg));
        bg
    }

    fn trigger_spec(&self, cx: &Cx<'_>) -> LoopResult<SceneSpec> {
        let m = measure(&*cx.host, self.info.index)?;
        Ok(SceneSpec::new(m.top, m.height, cx.config.trigger_hook))
    }

    /// Create the viewport trigger, subscribe to `sequence:reset` and attach the
    /// behavior. Missing geometry leaves the block bound without a trigger; the next
    /// [`ContentBlock::refresh`] retries.
    pub fn bind_trigger(&mut self, cx: &mut Cx<'_>) -> LoopResult<()> {
        if self.is_destroyed() {
            return Err(LoopError::lifecycle(format!(
                "cannot bind destroyed block {}",
                self.info.index
            )));
        }
        if self.state != BlockState::Created {
            return Ok(());
        }
        let me = Subscriber::Block(self.info.index);
        self.reset_sub = Some(cx.bus.on(Topic::SequenceReset, me));
        let geometry = self.trigger_spec(cx);
        if let Ok(spec) = &geometry {
            let owner = SceneOwner {
                block: self.info.index,
                role: SceneRole::Trigger,
            };
            self.trigger = Some(cx.scenes.create(owner, *spec));
        }
        for b in &mut self.behaviors {
            b.attach(&self.info, cx);
        }
        self.state = BlockState::Bound;
        tracing::debug!(
            block = self.info.index.0,
            slot = self.slot,
            name = %self.name,
            "block bound"
        );
        geometry.map(|_| ())
    }

    /// Re-measure and move the trigger, carrying its last evaluated state.
    pub fn refresh_trigger(&mut self, cx: &mut Cx<'_>) -> LoopResult<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let spec = self.trigger_spec(cx)?;
        self.trigger = match self.trigger {
            Some(id) => match cx.scenes.spec(id) {
                Some(old) if old.top == spec.top && old.trigger_hook == spec.trigger_hook => {
                    cx.scenes.update_duration(id, spec.duration);
                    Some(id)
                }
                _ => cx.scenes.replace(id, spec),
            },
            None => Some(cx.scenes.create(
                SceneOwner {
                    block: self.info.index,
                    role: SceneRole::Trigger,
                },
                spec,
            )),
        };
        Ok(())
    }

    /// Geometry changed: move the trigger and let the behaviors re-measure.
    pub fn refresh(&mut self, cx: &mut Cx<'_>) -> LoopResult<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let res = self.refresh_trigger(cx);
        for b in &mut self.behaviors {
            b.refresh(&self.info, cx);
        }
        res
    }

    /// Rebuild after a `sequence:reset`: fresh trigger geometry, behaviors reset.
    pub fn rebind(&mut self, cx: &mut Cx<'_>) -> LoopResult<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let res = self.refresh_trigger(cx);
        for b in &mut self.behaviors {
            b.reset(&self.info, cx);
        }
        res
    }

    pub fn on_event(&mut self, event: &Event, cx: &mut Cx<'_>) -> LoopResult<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        if let Event::SequenceReset { .. } = event {
            return self.rebind(cx);
        }
        for b in &mut self.behaviors {
            b.on_event(&self.info, cx, event);
        }
        Ok(())
    }

    pub fn on_scene(&mut self, event: &SceneEvent, cx: &mut Cx<'_>) {
        if self.is_destroyed() {
            return;
        }
        if event.owner.role == SceneRole::Trigger {
            if Some(event.scene) == self.trigger {
                self.on_trigger(event.kind, event.direction, cx);
            }
            return;
        }
        for b in &mut self.behaviors {
            b.on_scene(&self.info, cx, event);
        }
    }

    fn on_trigger(&mut self, kind: SceneEventKind, direction: ScrollDirection, cx: &mut Cx<'_>) {
        let index = self.info.index;
        match kind {
            SceneEventKind::Enter => {
                self.state = BlockState::Entered;
                cx.host.apply(index, VisualEffect::InView(true));
                cx.bus.emit(Event::BlockEnter { index, direction });
                if self.is_last && direction != ScrollDirection::Reverse {
                    cx.bus.emit(Event::SequenceDuplicate { index });
                }
            }
            SceneEventKind::Leave => {
                self.state = BlockState::Left;
                cx.host.apply(index, VisualEffect::InView(false));
                cx.bus.emit(Event::BlockLeave { index, direction });
            }
            SceneEventKind::Progress(_) => {}
        }
    }

    pub fn on_scroll(&mut self, scroll_top: f64, cx: &mut Cx<'_>) {
        if self.is_destroyed() {
            return;
        }
        for b in &mut self.behaviors {
            b.on_scroll(&self.info, cx, scroll_top);
        }
    }

    /// Release the trigger, the behaviors, every bus subscription and the rendered
    /// output. Returns `false` (and changes nothing) if already destroyed.
    pub fn destroy(&mut self, cx: &mut Cx<'_>) -> bool {
        let index = self.info.index;
        if self.is_destroyed() {
            tracing::warn!(block = index.0, "destroy called on a destroyed block");
            return false;
        }
        if let Some(id) = self.trigger.take() {
            cx.scenes.destroy(id);
        }
        for mut b in std::mem::take(&mut self.behaviors) {
            b.destroy(&self.info, cx);
        }
        let mut released = 0;
        if let Some(id) = self.reset_sub.take() {
            released += usize::from(cx.bus.off(id));
        }
        released += cx.bus.off_all(Subscriber::Block(index));
        cx.host.unmount(index);
        self.state = BlockState::Destroyed;
        tracing::debug!(block = index.0, released, "block destroyed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        behavior::{Ball, BallState},
        core::BlockRange,
        cx::harness::Harness,
        geometry::LayoutHost,
        model::{BehaviorKind, RotatorParams},
    };

    fn block(i: u64, template: &TemplateBlock) -> ContentBlock {
        ContentBlock::new(BlockIndex(i), template, 5)
    }

    fn drained(h: &mut Harness) -> Vec<Event> {
        std::iter::from_fn(|| h.bus.next_event()).collect()
    }

    #[test]
    fn background_alternates_unless_flagged() {
        use Background::*;
        assert_eq!(background_after(None, false, false), White);
        assert_eq!(background_after(Some(White), false, false), Black);
        assert_eq!(background_after(Some(Black), false, true), Black);
        assert_eq!(background_after(Some(Black), false, false), White);
        assert_eq!(background_after(Some(Black), true, true), White);
    }

    #[test]
    fn index_maps_to_copy_and_slot() {
        let b = block(12, &TemplateBlock::new("x", 10.0));
        assert_eq!(b.info().copy, 2);
        assert_eq!(b.slot(), 2);
        assert_eq!(b.state(), BlockState::Created);
    }

    #[test]
    fn enter_on_tail_requests_duplication() {
        let mut h = Harness::with_blocks(400.0, &[500.0, 500.0]);
        let t = TemplateBlock::new("b", 500.0);
        let mut b = ContentBlock::new(BlockIndex(1), &t, 2);
        b.set_last(true);
        b.bind_trigger(&mut h.cx()).unwrap();
        assert_eq!(b.state(), BlockState::Bound);

        // trigger position = scroll + 200; block spans [500, 1000)
        h.scenes.update(0.0);
        for ev in h.scenes.update(400.0) {
            b.on_scene(&ev, &mut h.cx());
        }
        assert_eq!(b.state(), BlockState::Entered);
        assert!(h.host.style(BlockIndex(1)).unwrap().in_view);
        let topics: Vec<_> = drained(&mut h).iter().map(Event::topic).collect();
        assert_eq!(topics, vec![Topic::BlockEnter, Topic::SequenceDuplicate]);

        for ev in h.scenes.update(900.0) {
            b.on_scene(&ev, &mut h.cx());
        }
        assert_eq!(b.state(), BlockState::Left);
        let topics: Vec<_> = drained(&mut h).iter().map(Event::topic).collect();
        assert_eq!(topics, vec![Topic::BlockLeave]);
    }

    #[test]
    fn reverse_enter_on_tail_does_not_duplicate() {
        let mut h = Harness::with_blocks(400.0, &[500.0, 500.0]);
        let t = TemplateBlock::new("b", 500.0);
        let mut b = ContentBlock::new(BlockIndex(1), &t, 2);
        b.set_last(true);
        b.bind_trigger(&mut h.cx()).unwrap();
        h.scenes.update(600.0);
        h.scenes.update(2_000.0);
        drained(&mut h);
        for ev in h.scenes.update(700.0) {
            b.on_scene(&ev, &mut h.cx());
        }
        let topics: Vec<_> = drained(&mut h).iter().map(Event::topic).collect();
        assert_eq!(topics, vec![Topic::BlockEnter]);
    }

    #[test]
    fn destroy_is_idempotent_and_releases_everything() {
        let mut h = Harness::with_blocks(400.0, &[500.0]);
        let t = TemplateBlock::new("i", 500.0).with_behavior(BehaviorKind::Intro);
        let mut b = block(0, &t);
        b.bind_trigger(&mut h.cx()).unwrap();
        let me = Subscriber::Block(BlockIndex(0));
        assert_eq!(h.bus.count_for(me), 2);
        assert_eq!(h.scenes.count_for(BlockIndex(0)), 1);

        assert!(b.destroy(&mut h.cx()));
        let after_once = (h.bus.active_count(), h.scenes.live_count(), h.host.mounted());
        assert!(!b.destroy(&mut h.cx()));
        assert_eq!(
            (h.bus.active_count(), h.scenes.live_count(), h.host.mounted()),
            after_once
        );
        assert_eq!(after_once.0, 0);
        assert_eq!(after_once.1, 0);
        assert!(after_once.2.is_empty());
        assert!(b.is_destroyed());
        assert!(b.bind_trigger(&mut h.cx()).is_err());
    }

    #[test]
    fn missing_geometry_binds_without_trigger_until_refresh() {
        let mut h = Harness::new(400.0);
        let t = TemplateBlock::new("late", 300.0);
        let mut b = block(0, &t);
        assert!(matches!(
            b.bind_trigger(&mut h.cx()),
            Err(LoopError::Geometry(_))
        ));
        assert_eq!(b.state(), BlockState::Bound);
        assert_eq!(b.trigger(), None);

        h.host.mount(BlockIndex(0), &t);
        b.refresh(&mut h.cx()).unwrap();
        assert!(b.trigger().is_some());
    }

    #[test]
    fn reset_event_rebinds_and_moves_trigger() {
        let mut h = Harness::with_blocks(400.0, &[500.0, 500.0]);
        let t = TemplateBlock::new("b", 500.0);
        let mut b = ContentBlock::new(BlockIndex(1), &t, 2);
        b.bind_trigger(&mut h.cx()).unwrap();
        let first = b.trigger().unwrap();

        h.host.set_height(BlockIndex(0), 200.0);
        let generation = h.bus.advance_generation();
        let reset = Event::SequenceReset {
            generation,
            live: BlockRange::empty_at(BlockIndex(0)),
        };
        b.on_event(&reset, &mut h.cx()).unwrap();
        let moved = b.trigger().unwrap();
        assert_ne!(first, moved);
        assert_eq!(h.scenes.spec(moved).unwrap().top, 200.0);
        assert_eq!(h.scenes.live_count(), 1);
    }

    #[test]
    fn rotator_runs_alongside_the_intro() {
        let mut h = Harness::with_blocks(300.0, &[600.0, 600.0]);
        let t = TemplateBlock::new("intro", 600.0)
            .with_behavior(BehaviorKind::Intro)
            .with_rotator(RotatorParams::new(0.0, -90.0, -50.0));
        let mut b = ContentBlock::new(BlockIndex(1), &t, 2);
        b.bind_trigger(&mut h.cx()).unwrap();
        let names: Vec<_> = b.behaviors().map(|x| x.name()).collect();
        assert_eq!(names, vec!["intro", "rotator"]);
        assert!(b.behaviors().all(|x| x.is_attached()));
        assert!(matches!(h.balls.state(Ball::One), BallState::Shown { .. }));

        // Rotation window is [600, 900).
        b.on_scroll(750.0, &mut h.cx());
        assert_eq!(h.host.style(BlockIndex(1)).unwrap().rotate_deg, -45.0);

        b.destroy(&mut h.cx());
        assert_eq!(b.behaviors().count(), 0);
        assert_eq!(h.bus.active_count(), 0);
    }
}
