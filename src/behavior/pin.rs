use super::{Behavior, BlockInfo, Lifecycle, sync_scene};
use crate::{
    cx::Cx,
    geometry::{VisualEffect, measure},
    scene::{SceneEvent, SceneEventKind, SceneId, SceneSpec},
};

/// Keeps a block's title fixed while the block's own top half-screen is scrolled past.
#[derive(Debug, Default)]
pub struct PinTitle {
    scene: Option<SceneId>,
    attached: bool,
}

impl PinTitle {
    pub fn scene(&self) -> Option<SceneId> {
        self.scene
    }

    /// Create or move the scene. Unusable geometry keeps whatever scene exists.
    fn sync(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        match measure(&*cx.host, block.index) {
            Ok(m) => sync_scene(
                &mut self.scene,
                Some(SceneSpec::new(m.top, m.height, 0.0)),
                block,
                cx,
            ),
            Err(e) => {
                tracing::debug!(block = block.index.0, error = %e, "pin scene deferred");
            }
        }
    }
}

impl Lifecycle for PinTitle {
    fn attach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.attached = true;
        self.sync(block, cx);
    }

    fn detach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        if let Some(id) = self.scene.take() {
            cx.scenes.destroy(id);
            cx.host.apply(block.index, VisualEffect::TitleFixed(false));
        }
        self.attached = false;
    }

    fn reset(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.attach(block, cx);
    }
}

impl Behavior for PinTitle {
    fn name(&self) -> &'static str {
        "pin_title"
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn on_scene(&mut self, block: &BlockInfo, cx: &mut Cx<'_>, event: &SceneEvent) {
        if Some(event.scene) != self.scene {
            return;
        }
        match event.kind {
            SceneEventKind::Enter => cx.host.apply(block.index, VisualEffect::TitleFixed(true)),
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
    use crate::{core::BlockIndex, cx::harness::Harness, scene::SceneState};

    fn info(i: u64) -> BlockInfo {
        BlockInfo {
            index: BlockIndex(i),
            copy: 0,
            previous: None,
        }
    }

    fn title_fixed(h: &Harness, i: u64) -> bool {
        h.host.style(BlockIndex(i)).unwrap().title_fixed
    }

    #[test]
    fn title_is_fixed_while_scene_is_active() {
        let mut h = Harness::with_blocks(400.0, &[500.0, 500.0, 500.0]);
        let mut pin = PinTitle::default();
        let b = info(1);
        pin.attach(&b, &mut h.cx());
        assert!(pin.is_attached());

        for y in [100.0, 600.0, 1_200.0] {
            let events = h.scenes.update(y);
            for ev in &events {
                pin.on_scene(&b, &mut h.cx(), ev);
            }
            let expect = (500.0..1_000.0).contains(&y);
            assert_eq!(title_fixed(&h, 1), expect, "scroll {y}");
        }
    }

    #[test]
    fn refresh_follows_geometry() {
        let mut h = Harness::with_blocks(400.0, &[500.0, 500.0]);
        let mut pin = PinTitle::default();
        let b = info(1);
        pin.attach(&b, &mut h.cx());
        let first = pin.scene().unwrap();

        h.host.set_height(BlockIndex(1), 800.0);
        pin.refresh(&b, &mut h.cx());
        assert_eq!(pin.scene(), Some(first));
        assert_eq!(h.scenes.spec(first).unwrap().duration, 800.0);

        h.host.set_height(BlockIndex(0), 300.0);
        pin.refresh(&b, &mut h.cx());
        let moved = pin.scene().unwrap();
        assert_ne!(moved, first);
        assert_eq!(h.scenes.spec(moved).unwrap().top, 300.0);
        assert_eq!(h.scenes.live_count(), 1);
    }

    #[test]
    fn detach_releases_scene() {
        let mut h = Harness::with_blocks(400.0, &[500.0]);
        let mut pin = PinTitle::default();
        let b = info(0);
        pin.attach(&b, &mut h.cx());
        pin.reset(&b, &mut h.cx());
        assert_eq!(h.scenes.live_count(), 1);
        pin.destroy(&b, &mut h.cx());
        assert_eq!(h.scenes.live_count(), 0);
        assert!(!pin.is_attached());
    }

    #[test]
    fn reset_keeps_an_active_pin() {
        let mut h = Harness::with_blocks(400.0, &[2_000.0, 500.0]);
        let mut pin = PinTitle::default();
        let b = info(0);
        pin.attach(&b, &mut h.cx());
        for ev in h.scenes.update(1_000.0) {
            pin.on_scene(&b, &mut h.cx(), &ev);
        }
        assert!(title_fixed(&h, 0));

        pin.reset(&b, &mut h.cx());
        assert!(title_fixed(&h, 0));
        let id = pin.scene().unwrap();
        assert_eq!(h.scenes.state(id), Some(SceneState::During));
        assert_eq!(h.scenes.live_count(), 1);

        // Still inside the block: no second enter.
        let events = h.scenes.update(1_100.0);
        assert!(events.iter().all(|e| e.kind != SceneEventKind::Enter));
    }
}
