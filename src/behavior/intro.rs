use super::{Ball, Behavior, BlockInfo, Lifecycle, sync_scene};
use crate::{
    bus::{Event, Subscriber, SubscriptionId, Topic},
    core::ScrollDirection,
    cx::Cx,
    geometry::{VisualEffect, measure},
    scene::{SceneEvent, SceneEventKind, SceneId, SceneSpec},
};

/// Intro section.
///
/// The original copy presents the balls and drops the first one when the block is left.
/// Repeated copies are marked as such and run two scenes:
/// - the title is pinned while the previous block scrolls through (scene anchored on
///   the previous block, twice its height long);
/// - the ball drawn at the end of the previous block is pinned and slides down onto
///   this block's own ball, which takes over once the slide is complete.
#[derive(Debug, Default)]
pub struct Intro {
    attached: bool,
    dropped: bool,
    leave_sub: Option<SubscriptionId>,
    measure_sub: Option<SubscriptionId>,
    title_scene: Option<SceneId>,
    ball_scene: Option<SceneId>,
}

impl Intro {
    pub fn title_scene(&self) -> Option<SceneId> {
        self.title_scene
    }

    pub fn ball_scene(&self) -> Option<SceneId> {
        self.ball_scene
    }

    fn title_spec(block: &BlockInfo, cx: &Cx<'_>) -> Option<SceneSpec> {
        let prev = block.previous?;
        match measure(&*cx.host, prev) {
            Ok(m) => Some(SceneSpec::new(m.top, m.height * 2.0, 0.0)),
            Err(e) => {
                tracing::debug!(block = block.index.0, error = %e, "intro title scene deferred");
                None
            }
        }
    }

    /// Starts one ball height above this block and lasts until the pinned ball has
    /// travelled down to this block's ball.
    fn ball_spec(block: &BlockInfo, cx: &Cx<'_>) -> Option<SceneSpec> {
        let _ = block.previous?;
        let m = measure(&*cx.host, block.index).ok()?;
        let (offset, size) = (cx.config.intro_ball_offset, cx.config.intro_ball_size);
        Some(SceneSpec::new(m.top, offset + size, 0.0).with_offset(-size))
    }

    fn sync_scenes(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        let title = Self::title_spec(block, cx);
        sync_scene(&mut self.title_scene, title, block, cx);
        let ball = Self::ball_spec(block, cx);
        sync_scene(&mut self.ball_scene, ball, block, cx);
    }

    /// Place both balls on this block. Positions read mid-animation may belong to blocks
    /// that are about to be evicted, so while auto scrolling this waits for the end.
    fn present_balls(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if cx.scroll.is_auto_scrolling() {
            if self.measure_sub.is_none() {
                self.measure_sub =
                    Some(cx.bus.once(Topic::ScrollAutoEnd, Subscriber::Block(block.index)));
                tracing::debug!(block = block.index.0, "ball placement waits for auto scroll");
            }
            return;
        }
        match measure(&*cx.host, block.index) {
            Ok(m) => {
                let top = m.top + cx.config.intro_ball_offset;
                for ball in Ball::ALL {
                    cx.balls.show(ball, top);
                }
            }
            Err(e) => tracing::debug!(block = block.index.0, error = %e, "balls not placed"),
        }
    }

    fn subscribe_leave(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if let Some(id) = self.leave_sub.take() {
            cx.bus.off(id);
        }
        if !self.dropped {
            self.leave_sub = Some(
                cx.bus
                    .on_versioned(Topic::BlockLeave, Subscriber::Block(block.index)),
            );
        }
    }
}

impl Lifecycle for Intro {
    fn attach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.attached = true;
        if block.copy == 0 {
            if !self.dropped {
                self.present_balls(block, cx);
            }
            self.subscribe_leave(block, cx);
            return;
        }
        cx.host.apply(block.index, VisualEffect::Repeated);
        self.sync_scenes(block, cx);
    }

    fn detach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        for id in [self.leave_sub.take(), self.measure_sub.take()].into_iter().flatten() {
            cx.bus.off(id);
        }
        if let Some(id) = self.title_scene.take() {
            cx.scenes.destroy(id);
            cx.host.apply(block.index, VisualEffect::TitleFixed(false));
        }
        if let Some(id) = self.ball_scene.take() {
            cx.scenes.destroy(id);
        }
        self.attached = false;
    }

    /// The versioned leave subscription lapses with the generation and is renewed;
    /// scenes move in place.
    fn reset(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if !self.attached {
            self.attach(block, cx);
        } else if block.copy == 0 {
            self.subscribe_leave(block, cx);
        } else {
            self.sync_scenes(block, cx);
        }
    }
}

impl Behavior for Intro {
    fn name(&self) -> &'static str {
        "intro"
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn on_event(&mut self, block: &BlockInfo, cx: &mut Cx<'_>, event: &Event) {
        match event {
            Event::ScrollAutoEnd => {
                // Consumed by delivery.
                if self.measure_sub.take().is_some() && !self.dropped {
                    self.present_balls(block, cx);
                }
            }
            Event::BlockLeave { index, .. } => {
                if *index != block.index || self.dropped || self.leave_sub.is_none() {
                    return;
                }
                cx.balls.drop_ball(Ball::One);
                self.dropped = true;
                if let Some(id) = self.leave_sub.take() {
                    cx.bus.off(id);
                }
            }
            _ => {}
        }
    }

    fn on_scene(&mut self, block: &BlockInfo, cx: &mut Cx<'_>, event: &SceneEvent) {
        if Some(event.scene) == self.title_scene {
            let fixed = match event.kind {
                SceneEventKind::Enter => true,
                SceneEventKind::Leave => false,
                SceneEventKind::Progress(_) => return,
            };
            cx.host.apply(block.index, VisualEffect::TitleFixed(fixed));
            return;
        }
        if Some(event.scene) != self.ball_scene {
            return;
        }
        match (event.kind, event.direction) {
            (SceneEventKind::Progress(p), _) => {
                if let Some(prev) = block.previous {
                    let travel = p * cx.config.intro_ball_offset;
                    cx.host.apply(prev, VisualEffect::BallTranslate(travel));
                }
            }
            (SceneEventKind::Enter, ScrollDirection::Reverse) => {
                cx.host.apply(block.index, VisualEffect::BallShown(false))
            }
            (SceneEventKind::Leave, ScrollDirection::Forward) => {
                cx.host.apply(block.index, VisualEffect::BallShown(true))
            }
            _ => {}
        }
    }

    fn refresh(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if !self.attached {
            return;
        }
        if block.copy == 0 {
            if !self.dropped {
                self.present_balls(block, cx);
            }
            return;
        }
        self.sync_scenes(block, cx);
    }
}
