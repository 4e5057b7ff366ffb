use super::{Behavior, BlockInfo, Lifecycle};
use crate::{
    cx::Cx,
    geometry::{VisualEffect, measure},
    model::RotatorParams,
};

/// Rotates a block's surface as the page scrolls through its first half.
///
/// Progress runs from 0 at `top + start_ratio * viewport` to 1 half a block height
/// later.
#[derive(Debug)]
pub struct Rotator {
    start_ratio: f64,
    end_rotate_deg: f64,
    end_translate: f64,
    attached: bool,
    window: Option<(f64, f64)>, // (rotate start, halfway)
    progress: Option<f64>,
}

impl Rotator {
    pub fn new(start_ratio: f64, end_rotate_deg: f64, end_translate: f64) -> Self {
        Self {
            start_ratio,
            end_rotate_deg,
            end_translate,
            attached: false,
            window: None,
            progress: None,
        }
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }
}

impl From<RotatorParams> for Rotator {
    fn from(p: RotatorParams) -> Self {
        Self::new(p.start_ratio, p.end_rotate_deg, p.end_translate)
    }
}

impl Lifecycle for Rotator {
    fn attach(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.attached = true;
        self.refresh(block, cx);
    }

    fn detach(&mut self, _block: &BlockInfo, _cx: &mut Cx<'_>) {
        self.attached = false;
    }
}

impl Behavior for Rotator {
    fn name(&self) -> &'static str {
        "rotator"
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn refresh(&mut self, block: &BlockInfo, cx: &mut Cx<'_>) {
        self.window = match measure(&*cx.host, block.index) {
            Ok(m) => {
                let start = m.top + self.start_ratio * cx.host.viewport_height();
                Some((start, start + m.height / 2.0)).filter(|(s, h)| s.is_finite() && h > s)
            }
            Err(e) => {
                tracing::debug!(block = block.index.0, error = %e, "rotator window deferred");
                None
            }
        };
    }

    fn on_scroll(&mut self, block: &BlockInfo, cx: &mut Cx<'_>, scroll_top: f64) {
        if !self.attached {
            return;
        }
        let Some((start, halfway)) = self.window else {
            return;
        };
        let progress = ((scroll_top - start).max(0.0) / (halfway - start)).min(1.0);
        if !progress.is_finite() || self.progress == Some(progress) {
            return;
        }
        self.progress = Some(progress);
        cx.host.apply(
            block.index,
            VisualEffect::Rotate {
                degrees: self.end_rotate_deg * progress,
                translate: self.end_translate * progress,
            },
        );
    }
}
