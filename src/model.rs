use crate::{
    error::{LoopError, LoopResult},
    tween::Ease,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub duplicate_limit: u32,   // copies beyond the original before the oldest is evicted
    pub trigger_hook: f64,      // 0..=1 of viewport height
    pub settle_delay_ms: u64,   // auto-scroll end deferral
    pub scroll_duration_ms: u64,
    pub scroll_ease: Ease,
    pub listeners_per_block: usize,
    pub base_listeners: usize,
    pub strict_listener_bound: bool,
    pub indicator_link_size: f64,
    pub indicator_link_margin: f64,
    pub intro_ball_offset: f64, // ball two's top within the intro block
    pub intro_ball_size: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            duplicate_limit: 3,
            trigger_hook: 0.5,
            settle_delay_ms: 300,
            scroll_duration_ms: 800,
            scroll_ease: Ease::OutCubic,
            listeners_per_block: 4,
            base_listeners: 16,
            strict_listener_bound: false,
            indicator_link_size: 16.0,
            indicator_link_margin: 10.0,
            intro_ball_offset: 320.0,
            intro_ball_size: 80.0,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> LoopResult<()> {
        if self.duplicate_limit == 0 {
            return Err(LoopError::validation("duplicate_limit must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.trigger_hook) {
            return Err(LoopError::validation("trigger_hook must be within 0..=1"));
        }
        if self.listeners_per_block == 0 {
            return Err(LoopError::validation("listeners_per_block must be > 0"));
        }
        if !self.indicator_link_size.is_finite() || !self.indicator_link_margin.is_finite() {
            return Err(LoopError::validation("indicator link layout must be finite"));
        }
        if !(self.intro_ball_offset.is_finite() && self.intro_ball_offset >= 0.0) {
            return Err(LoopError::validation("intro_ball_offset must be finite and >= 0"));
        }
        if !(self.intro_ball_size.is_finite() && self.intro_ball_size > 0.0) {
            return Err(LoopError::validation("intro_ball_size must be finite and > 0"));
        }
        Ok(())
    }

    /// Subscriber bound for a sequence of `live_blocks` blocks.
    pub fn listener_bound(&self, live_blocks: usize) -> usize {
        self.base_listeners
            .saturating_add(self.listeners_per_block.saturating_mul(live_blocks))
    }
}

/// Surface rotation over the first half of a block.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RotatorParams {
    pub start_ratio: f64, // relative to viewport height, added to the block top
    pub end_rotate_deg: f64,
    pub end_translate: f64,
}

impl Default for RotatorParams {
    fn default() -> Self {
        Self {
            start_ratio: -1.0 / 3.0,
            end_rotate_deg: 0.0,
            end_translate: 0.0,
        }
    }
}

impl RotatorParams {
    pub fn new(start_ratio: f64, end_rotate_deg: f64, end_translate: f64) -> Self {
        Self {
            start_ratio,
            end_rotate_deg,
            end_translate,
        }
    }

    fn is_finite(&self) -> bool {
        self.start_ratio.is_finite()
            && self.end_rotate_deg.is_finite()
            && self.end_translate.is_finite()
    }
}

/// Per-block visual effect selected by the template.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BehaviorKind {
    #[default]
    None,
    Rotator(RotatorParams),
    PinTitle,
    Intro,
    /// Title pinned over the previous block; carries a clone of ball one that drops on
    /// the first forward leave.
    Curious,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TemplateBlock {
    pub name: String,
    pub height: f64, // nominal height, consumed by in-memory layout hosts
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub repeat_background: bool,
    #[serde(default)]
    pub behavior: BehaviorKind,
    /// Extra rotator running next to `behavior`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotator: Option<RotatorParams>,
}

impl TemplateBlock {
    pub fn new(name: impl Into<String>, height: f64) -> Self {
        Self {
            name: name.into(),
            height,
            first: false,
            repeat_background: false,
            behavior: BehaviorKind::None,
            rotator: None,
        }
    }

    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    pub fn repeat_background(mut self) -> Self {
        self.repeat_background = true;
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorKind) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_rotator(mut self, rotator: RotatorParams) -> Self {
        self.rotator = Some(rotator);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { height: 800.0 }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageSpec {
    #[serde(default)]
    pub config: LoopConfig,
    #[serde(default)]
    pub viewport: Viewport,
    pub template: Vec<TemplateBlock>,
}

impl PageSpec {
    pub fn new(template: Vec<TemplateBlock>) -> Self {
        Self {
            config: LoopConfig::default(),
            viewport: Viewport::default(),
            template,
        }
    }

    pub fn from_json(s: &str) -> LoopResult<Self> {
        let spec: Self = serde_json::from_str(s)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> LoopResult<()> {
        self.config.validate()?;
        if !(self.viewport.height.is_finite() && self.viewport.height > 0.0) {
            return Err(LoopError::validation("viewport height must be finite and > 0"));
        }
        if self.template.is_empty() {
            return Err(LoopError::validation("template must contain at least one block"));
        }
        for (slot, block) in self.template.iter().enumerate() {
            if block.name.trim().is_empty() {
                return Err(LoopError::validation(format!(
                    "template block {slot} must have a non-empty name"
                )));
            }
            if !(block.height.is_finite() && block.height > 0.0) {
                return Err(LoopError::validation(format!(
                    "template block '{}' height must be finite and > 0",
                    block.name
                )));
            }
            let rotators = match &block.behavior {
                BehaviorKind::Rotator(params) => [Some(params), block.rotator.as_ref()],
                _ => [None, block.rotator.as_ref()],
            };
            if rotators.into_iter().flatten().any(|r| !r.is_finite()) {
                return Err(LoopError::validation(format!(
                    "rotator on '{}' must use finite parameters",
                    block.name
                )));
            }
        }
        Ok(())
    }
}
