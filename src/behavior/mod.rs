//! Per-block visual behaviors (rotation, title pinning, intro balls).
//!
//! Every behavior implements the same lifecycle explicitly instead of inheriting a
//! shared reset routine: `attach` registers whatever the behavior needs (scenes,
//! versioned subscriptions), `detach` releases it. `reset` defaults to detach + attach;
//! behaviors that own scenes override it to move them in place, so a scene that is
//! active when the sequence resets stays active.

mod balls;
mod curious;
mod intro;
mod pin;
mod rotator;

pub use balls::{Ball, BallClone, BallState, Balls};
pub use curious::Curious;
pub use intro::Intro;
pub use pin::PinTitle;
pub use rotator::Rotator;

use crate::{
    bus::Event,
    core::BlockIndex,
    cx::Cx,
    model::{BehaviorKind, TemplateBlock},
    scene::{SceneEvent, SceneId, SceneOwner, SceneRole, SceneSpec},
};

/// What a behavior knows about the block that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub index: BlockIndex,
    pub copy: u64,
    pub previous: Option<BlockIndex>,
}

pub trait Lifecycle {
    fn attach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>);
    fn detach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>);

    fn reset(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.detach(block, cx);
        self.attach(block, cx);
    }
}

pub trait Behavior: Lifecycle + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn is_attached(&self) -> bool;

    fn on_scroll(&mut self, _block: &BlockInfo, _cx: &mut Cx<'_>, _scroll_top: f64) {}
    fn on_event(&mut self, _block: &BlockInfo, _cx: &mut Cx<'_>, _event: &Event) {}
    fn on_scene(&mut self, _block: &BlockInfo, _cx: &mut Cx<'_>, _event: &SceneEvent) {}

    /// Geometry changed (resize); recompute from fresh measurements.
    fn refresh(&mut self, _block: &BlockInfo, _cx: &mut Cx<'_>) {}

    /// Release everything. Called once, when the owning block is destroyed.
    fn destroy(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.detach(block, cx);
    }
}

pub fn build(kind: &BehaviorKind) -> Option<Box<dyn Behavior>> {
    match kind {
        BehaviorKind::None => None,
        BehaviorKind::Rotator(params) => Some(Box::new(Rotator::from(*params))),
        BehaviorKind::PinTitle => Some(Box::new(PinTitle::default())),
        BehaviorKind::Intro => Some(Box::new(Intro::default())),
        BehaviorKind::Curious => Some(Box::new(Curious::default())),
    }
}

/// Everything a template block asks for: its behavior, then the extra rotator.
pub fn build_all(template: &TemplateBlock) -> Vec<Box<dyn Behavior>> {
    let extra = template
        .rotator
        .map(|params| Box::new(Rotator::from(params)) as Box<dyn Behavior>);
    build(&template.behavior).into_iter().chain(extra).collect()
}

/// Point `slot` at a scene matching `spec`.
///
/// An unchanged anchor only updates the duration; a moved one is replaced so the last
/// evaluated state carries over. `None` releases the scene.
pub(crate) fn sync_scene(
    slot: &mut Option<SceneId>,
    spec: Option<SceneSpec>,
    block: &BlockInfo,
    cx: &mut Cx<'_>,
) {
    let owner = SceneOwner {
        block: block.index,
        role: SceneRole::Behavior,
    };
    *slot = match (slot.take(), spec) {
        (Some(id), Some(spec)) => match cx.scenes.spec(id) {
            Some(old)
                if old.top == spec.top
                    && old.offset == spec.offset
                    && old.trigger_hook == spec.trigger_hook =>
            {
                cx.scenes.update_duration(id, spec.duration);
                Some(id)
            }
            _ => cx
                .scenes
                .replace(id, spec)
                .or_else(|| Some(cx.scenes.create(owner, spec))),
        },
        (None, Some(spec)) => Some(cx.scenes.create(owner, spec)),
        (Some(id), None) => {
            cx.scenes.destroy(id);
            None
        }
        (None, None) => None,
    };
}
