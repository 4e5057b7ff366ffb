use crate::{
    bus::{Event, EventBus, Subscriber, Topic},
    core::BlockIndex,
    cx::Cx,
    geometry::{LayoutHost, measure},
};

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Waypoint {
    pub index: BlockIndex,
    pub top: f64,
    pub bottom: f64,
}

/// Side navigation with one link per live block.
///
/// Waypoints are rebuilt from fresh geometry whenever the block list or the viewport
/// changes; they are never patched incrementally.
#[derive(Debug)]
pub struct PositionIndicator {
    link_size: f64,
    link_margin: f64,
    waypoints: Vec<Waypoint>,
    links: Vec<f64>,
    active: Option<usize>,
    rebuilds: u64,
}

impl PositionIndicator {
    pub fn new(link_size: f64, link_margin: f64) -> Self {
        Self {
            link_size,
            link_margin,
            waypoints: Vec::new(),
            links: Vec::new(),
            active: None,
            rebuilds: 0,
        }
    }

    pub fn attach(&self, bus: &mut EventBus) {
        for topic in [Topic::BlocksInited, Topic::SequenceReset, Topic::WindowResize] {
            bus.on(topic, Subscriber::Indicator);
        }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Vertical offsets of the links, centred in the viewport.
    pub fn link_offsets(&self) -> &[f64] {
        &self.links
    }

    pub fn active(&self) -> Option<BlockIndex> {
        self.active.map(|i| self.waypoints[i].index)
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn rebuild(
        &mut self,
        blocks: impl IntoIterator<Item = BlockIndex>,
        host: &dyn LayoutHost,
    ) {
        self.waypoints.clear();
        for index in blocks {
            match measure(host, index) {
                Ok(m) => self.waypoints.push(Waypoint {
                    index,
                    top: m.top,
                    bottom: m.bottom(),
                }),
                Err(e) => tracing::debug!(block = index.0, error = %e, "waypoint skipped"),
            }
        }
        if let Some(first) = self.waypoints.first_mut() {
            first.top = 0.0;
        }

        let n = self.waypoints.len() as f64;
        let stack = n * self.link_size + (n - 1.0).max(0.0) * self.link_margin;
        let start = (host.viewport_height() - stack) / 2.0;
        self.links = (0..self.waypoints.len())
            .map(|i| start + i as f64 * (self.link_size + self.link_margin))
            .collect();
        self.rebuilds += 1;
        self.on_scroll(host.scroll_top(), host.viewport_height());
    }

    pub fn on_scroll(&mut self, scroll_top: f64, viewport_height: f64) {
        self.active = self
            .waypoints
            .iter()
            .position(|w| scroll_top >= w.top - viewport_height && scroll_top <= w.bottom - 1.0);
    }

    pub fn on_event(
        &mut self,
        event: &Event,
        blocks: impl IntoIterator<Item = BlockIndex>,
        host: &dyn LayoutHost,
    ) {
        match event {
            Event::BlocksInited { .. } | Event::SequenceReset { .. } | Event::WindowResize => {
                self.rebuild(blocks, host)
            }
            _ => {}
        }
    }

    /// Start a tweened scroll to link `link`. Returns the target offset.
    pub fn click(&mut self, link: usize, cx: &mut Cx<'_>) -> Option<f64> {
        let top = self.waypoints.get(link)?.top;
        cx.scroll.scroll_to(
            top,
            cx.config.scroll_duration_ms,
            cx.config.scroll_ease,
            &*cx.host,
            cx.bus,
        );
        Some(top)
    }
}
