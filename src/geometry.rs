use std::collections::BTreeMap;

use crate::{
    core::{Background, BlockIndex, finite, finite_positive},
    error::{LoopError, LoopResult},
    model::TemplateBlock,
};

/// Presentation changes the core asks the rendering layer to apply to one block.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub enum VisualEffect {
    Background(Background),
    Anchor(String),
    InView(bool),
    Rotate { degrees: f64, translate: f64 },
    TitleFixed(bool),
    Repeated,
    /// Vertical offset of the ball pinned inside this block.
    BallTranslate(f64),
    /// Whether the ball drawn into this block's artwork is visible.
    BallShown(bool),
}

/// The layout/rendering engine as seen by the core.
///
/// Geometry reads must reflect post-reflow values. Implementations report unknown
/// blocks with non-finite geometry rather than panicking.
pub trait LayoutHost {
    /// Materialize a block from its template at the end of the document.
    fn mount(&mut self, index: BlockIndex, template: &TemplateBlock);
    /// Remove a block's rendered output.
    fn unmount(&mut self, index: BlockIndex);

    fn height(&self, index: BlockIndex) -> f64;
    fn top_offset(&self, index: BlockIndex) -> f64;
    fn viewport_height(&self) -> f64;

    fn scroll_top(&self) -> f64;
    fn set_scroll_top(&mut self, y: f64);

    fn apply(&mut self, index: BlockIndex, effect: VisualEffect);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measured {
    pub top: f64,
    pub height: f64,
}

impl Measured {
    pub fn bottom(self) -> f64 {
        self.top + self.height
    }
}

/// Read a block's geometry, refusing values that would poison scroll math.
pub fn measure(host: &dyn LayoutHost, index: BlockIndex) -> LoopResult<Measured> {
    let height = finite_positive(host.height(index))
        .ok_or_else(|| LoopError::geometry(format!("block {index} has no usable height")))?;
    let top = finite(host.top_offset(index))
        .ok_or_else(|| LoopError::geometry(format!("block {index} has no usable top offset")))?;
    Ok(Measured { top, height })
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct BlockStyle {
    pub background: Option<Background>,
    pub anchor: Option<String>,
    pub in_view: bool,
    pub rotate_deg: f64,
    pub translate: f64,
    pub title_fixed: bool,
    pub repeated: bool,
    pub ball_translate: f64,
    pub ball_shown: bool,
}

#[derive(Clone, Debug)]
struct StackEntry {
    index: BlockIndex,
    name: String,
    height: f64,
    style: BlockStyle,
}

/// In-memory vertical stack of blocks with a clamped scroll offset.
///
/// Used by the simulator binary and the tests as a stand-in for a real document.
#[derive(Clone, Debug)]
pub struct StackLayout {
    viewport_height: f64,
    scroll_top: f64,
    entries: Vec<StackEntry>,
    // Heights forced before a block is mounted (e.g. not yet laid out).
    overrides: BTreeMap<BlockIndex, f64>,
    mounts: u64,
    unmounts: u64,
}

impl StackLayout {
    pub fn new(viewport_height: f64) -> Self {
        Self {
            viewport_height,
            scroll_top: 0.0,
            entries: Vec::new(),
            overrides: BTreeMap::new(),
            mounts: 0,
            unmounts: 0,
        }
    }

    fn position(&self, index: BlockIndex) -> Option<usize> {
        self.entries.iter().position(|e| e.index == index)
    }

    pub fn content_height(&self) -> f64 {
        self.entries.iter().map(|e| e.height).sum()
    }

    pub fn max_scroll(&self) -> f64 {
        (self.content_height() - self.viewport_height).max(0.0)
    }

    /// Simulate a reflow that changes one block's height.
    pub fn set_height(&mut self, index: BlockIndex, height: f64) {
        match self.position(index) {
            Some(pos) => self.entries[pos].height = height,
            None => {
                self.overrides.insert(index, height);
            }
        }
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        self.viewport_height = height;
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
    }

    pub fn mounted(&self) -> Vec<BlockIndex> {
        self.entries.iter().map(|e| e.index).collect()
    }

    pub fn name(&self, index: BlockIndex) -> Option<&str> {
        self.position(index).map(|p| self.entries[p].name.as_str())
    }

    pub fn style(&self, index: BlockIndex) -> Option<&BlockStyle> {
        self.position(index).map(|p| &self.entries[p].style)
    }

    /// Block whose box contains document offset `y`.
    pub fn block_at(&self, y: f64) -> Option<BlockIndex> {
        let mut top = 0.0;
        for e in &self.entries {
            if y >= top && y < top + e.height {
                return Some(e.index);
            }
            top += e.height;
        }
        None
    }

    pub fn mount_count(&self) -> u64 {
        self.mounts
    }

    pub fn unmount_count(&self) -> u64 {
        self.unmounts
    }
}

impl LayoutHost for StackLayout {
    fn mount(&mut self, index: BlockIndex, template: &TemplateBlock) {
        let height = self.overrides.remove(&index).unwrap_or(template.height);
        self.mounts += 1;
        self.entries.push(StackEntry {
            index,
            name: template.name.clone(),
            height,
            style: BlockStyle::default(),
        });
    }

    fn unmount(&mut self, index: BlockIndex) {
        if let Some(pos) = self.position(index) {
            self.entries.remove(pos);
            self.unmounts += 1;
        }
    }

    fn height(&self, index: BlockIndex) -> f64 {
        self.position(index)
            .map(|p| self.entries[p].height)
            .unwrap_or(f64::NAN)
    }

    fn top_offset(&self, index: BlockIndex) -> f64 {
        match self.position(index) {
            Some(p) => self.entries[..p].iter().map(|e| e.height).sum(),
            None => f64::NAN,
        }
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn set_scroll_top(&mut self, y: f64) {
        if !y.is_finite() {
            tracing::warn!(y, "ignoring non-finite scroll offset");
            return;
        }
        self.scroll_top = y.clamp(0.0, self.max_scroll());
    }

    fn apply(&mut self, index: BlockIndex, effect: VisualEffect) {
        let Some(pos) = self.position(index) else {
            return;
        };
        let style = &mut self.entries[pos].style;
        match effect {
            VisualEffect::Background(bg) => style.background = Some(bg),
            VisualEffect::Anchor(id) => style.anchor = Some(id),
            VisualEffect::InView(v) => style.in_view = v,
            VisualEffect::Rotate { degrees, translate } => {
                style.rotate_deg = degrees;
                style.translate = translate;
            }
            VisualEffect::TitleFixed(v) => style.title_fixed = v,
            VisualEffect::Repeated => style.repeated = true,
            VisualEffect::BallTranslate(y) => style.ball_translate = y,
            VisualEffect::BallShown(v) => style.ball_shown = v,
        }
    }
}
