//! Viewport trigger primitive.
//!
//! A scene spans `[top + offset, top + offset + duration)` of document space and is
//! evaluated against the trigger position `scroll_top + viewport_height * trigger_hook`.
//! A zero duration makes the scene open-ended once its start is passed.

use std::collections::BTreeMap;

use crate::core::{BlockIndex, ScrollDirection};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SceneId(u64);

/// Which part of a block a scene belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SceneRole {
    Trigger,
    Behavior,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneOwner {
    pub block: BlockIndex,
    pub role: SceneRole,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneSpec {
    pub top: f64,
    pub duration: f64,
    pub offset: f64,
    pub trigger_hook: f64,
}

impl SceneSpec {
    pub fn new(top: f64, duration: f64, trigger_hook: f64) -> Self {
        Self {
            top,
            duration,
            offset: 0.0,
            trigger_hook,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    fn start(&self) -> f64 {
        self.top + self.offset
    }

    fn state_at(&self, trigger_pos: f64) -> SceneState {
        let start = self.start();
        if trigger_pos < start {
            SceneState::Before
        } else if self.duration <= 0.0 || trigger_pos < start + self.duration {
            SceneState::During
        } else {
            SceneState::After
        }
    }

    fn progress_at(&self, trigger_pos: f64) -> f64 {
        if self.duration <= 0.0 {
            return if trigger_pos >= self.start() { 1.0 } else { 0.0 };
        }
        ((trigger_pos - self.start()) / self.duration).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneState {
    Before,
    During,
    After,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SceneEventKind {
    Enter,
    Leave,
    Progress(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneEvent {
    pub scene: SceneId,
    pub owner: SceneOwner,
    pub kind: SceneEventKind,
    pub direction: ScrollDirection,
    pub state: SceneState,
}

#[derive(Clone, Debug)]
struct Scene {
    owner: SceneOwner,
    spec: SceneSpec,
    state: SceneState,
    progress: f64,
}

#[derive(Debug)]
pub struct SceneController {
    next_id: u64,
    scenes: BTreeMap<SceneId, Scene>,
    viewport_height: f64,
    last_scroll: Option<f64>,
}

impl SceneController {
    pub fn new(viewport_height: f64) -> Self {
        Self {
            next_id: 0,
            scenes: BTreeMap::new(),
            viewport_height,
            last_scroll: None,
        }
    }

    pub fn create(&mut self, owner: SceneOwner, spec: SceneSpec) -> SceneId {
        self.insert(owner, spec, SceneState::Before, 0.0)
    }

    fn insert(
        &mut self,
        owner: SceneOwner,
        spec: SceneSpec,
        state: SceneState,
        progress: f64,
    ) -> SceneId {
        let id = SceneId(self.next_id);
        self.next_id += 1;
        self.scenes.insert(
            id,
            Scene {
                owner,
                spec,
                state,
                progress,
            },
        );
        id
    }

    /// Destroy `id` and create a replacement with new boundaries, carrying over the
    /// last evaluated state. Returns `None` when `id` is not live.
    pub fn replace(&mut self, id: SceneId, spec: SceneSpec) -> Option<SceneId> {
        let old = self.scenes.remove(&id)?;
        Some(self.insert(old.owner, spec, old.state, old.progress))
    }

    pub fn destroy(&mut self, id: SceneId) -> bool {
        self.scenes.remove(&id).is_some()
    }

    pub fn update_duration(&mut self, id: SceneId, duration: f64) -> bool {
        match self.scenes.get_mut(&id) {
            Some(scene) => {
                scene.spec.duration = duration;
                true
            }
            None => false,
        }
    }

    pub fn spec(&self, id: SceneId) -> Option<SceneSpec> {
        self.scenes.get(&id).map(|s| s.spec)
    }

    pub fn state(&self, id: SceneId) -> Option<SceneState> {
        self.scenes.get(&id).map(|s| s.state)
    }

    pub fn contains(&self, id: SceneId) -> bool {
        self.scenes.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn count_for(&self, block: BlockIndex) -> usize {
        self.scenes.values().filter(|s| s.owner.block == block).count()
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        self.viewport_height = height;
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    /// Re-base direction tracking after a compensating scroll, without evaluating.
    pub fn sync_scroll(&mut self, scroll_top: f64) {
        if scroll_top.is_finite() {
            self.last_scroll = Some(scroll_top);
        }
    }

    /// Evaluate every scene against `scroll_top` in creation order.
    pub fn update(&mut self, scroll_top: f64) -> Vec<SceneEvent> {
        if !scroll_top.is_finite() || !self.viewport_height.is_finite() {
            return Vec::new();
        }
        let direction = self
            .last_scroll
            .map(|prev| ScrollDirection::between(prev, scroll_top))
            .unwrap_or(ScrollDirection::Paused);
        self.last_scroll = Some(scroll_top);

        let mut out = Vec::new();
        for (&id, scene) in &mut self.scenes {
            let trigger_pos = scroll_top + self.viewport_height * scene.spec.trigger_hook;
            if !trigger_pos.is_finite() || !scene.spec.start().is_finite() {
                continue;
            }
            let next = scene.spec.state_at(trigger_pos);
            let progress = scene.spec.progress_at(trigger_pos);
            let prev = scene.state;
            let mut push = |kind, state| {
                out.push(SceneEvent {
                    scene: id,
                    owner: scene.owner,
                    kind,
                    direction,
                    state,
                })
            };

            let crossed = prev != next;
            if crossed && prev != SceneState::During {
                push(SceneEventKind::Enter, SceneState::During);
            }
            if progress != scene.progress {
                push(SceneEventKind::Progress(progress), next);
            }
            if crossed && next != SceneState::During {
                push(SceneEventKind::Leave, next);
            }

            scene.state = next;
            scene.progress = progress;
        }
        out
    }
}
