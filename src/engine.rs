//! Runtime that owns every component and drives them from host input.
//!
//! The host reports three things: scroll offsets ([`Engine::on_scroll`]), viewport
//! changes ([`Engine::on_resize`]) and the passage of time ([`Engine::tick`]). Each entry
//! point evaluates the viewport triggers, then drains the bus until it is empty, so by
//! the time a call returns every consequence (duplication, eviction, resets) is applied.

use crate::{
    arrow::ArrowDownButton,
    behavior::Balls,
    bus::{Event, EventBus, ObserverId, Subscriber, Topic},
    core::BlockRange,
    cx::Cx,
    error::LoopResult,
    geometry::{LayoutHost, StackLayout},
    indicator::PositionIndicator,
    model::{LoopConfig, PageSpec},
    scene::SceneController,
    scroll::{ScrollCoordinator, ScrollSource},
    sequence::SequenceManager,
};

/// Snapshot of the engine's counters, as reported by the simulator.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct EngineSummary {
    pub live: BlockRange,
    pub blocks: usize,
    pub duplicate_count: u32,
    pub removed_count: u64,
    pub duplications: u64,
    pub evictions: u64,
    pub deferrals: u64,
    pub ignored: u64,
    pub scroll_top: f64,
    pub listeners: usize,
    pub max_listeners: usize,
    pub leak_signals: u64,
    pub scenes: usize,
    pub events: u64,
}

struct Parts<'a> {
    sequence: &'a mut SequenceManager,
    indicator: &'a mut PositionIndicator,
    arrow: &'a mut ArrowDownButton,
    observed: &'a mut Vec<(ObserverId, Event)>,
    cx: Cx<'a>,
}

pub struct Engine<H: LayoutHost> {
    host: H,
    config: LoopConfig,
    bus: EventBus,
    scenes: SceneController,
    scroll: ScrollCoordinator,
    balls: Balls,
    sequence: SequenceManager,
    indicator: PositionIndicator,
    arrow: ArrowDownButton,
    observed: Vec<(ObserverId, Event)>,
    next_observer: u32,
}

impl Engine<StackLayout> {
    /// Engine over an in-memory layout sized from the page's viewport.
    pub fn with_stack_layout(page: PageSpec) -> LoopResult<Self> {
        let host = StackLayout::new(page.viewport.height);
        Self::new(page, host)
    }
}

impl<H: LayoutHost> Engine<H> {
    pub fn new(page: PageSpec, host: H) -> LoopResult<Self> {
        page.validate()?;
        let PageSpec {
            config, template, ..
        } = page;
        let viewport = host.viewport_height();

        let mut engine = Self {
            bus: EventBus::new(config.listener_bound(template.len())),
            scenes: SceneController::new(viewport),
            scroll: ScrollCoordinator::new(config.settle_delay_ms),
            balls: Balls::default(),
            sequence: SequenceManager::new(config.duplicate_limit),
            indicator: PositionIndicator::new(
                config.indicator_link_size,
                config.indicator_link_margin,
            ),
            arrow: ArrowDownButton::default(),
            observed: Vec::new(),
            next_observer: 0,
            config,
            host,
        };
        engine.indicator.attach(&mut engine.bus);
        engine.arrow.attach(&mut engine.bus);

        let mut p = engine.parts();
        p.sequence.initialize(template, &mut p.cx)?;
        engine.pump()?;
        let y = engine.host.scroll_top();
        engine.process_scroll(y, ScrollSource::Programmatic)?;
        Ok(engine)
    }

    fn parts(&mut self) -> Parts<'_> {
        let Self {
            host,
            config,
            bus,
            scenes,
            scroll,
            balls,
            sequence,
            indicator,
            arrow,
            observed,
            ..
        } = self;
        Parts {
            sequence,
            indicator,
            arrow,
            observed,
            cx: Cx {
                bus,
                scenes,
                host,
                scroll,
                config,
                balls,
            },
        }
    }

    /// The host reports a new scroll offset.
    pub fn on_scroll(&mut self, y: f64) -> LoopResult<()> {
        if !y.is_finite() {
            tracing::warn!(y, "ignoring non-finite scroll offset");
            return Ok(());
        }
        self.host.set_scroll_top(y);
        let y = self.host.scroll_top();
        let source = self.scroll.classify(y);
        self.process_scroll(y, source)
    }

    /// The host's viewport (and possibly block heights) changed.
    pub fn on_resize(&mut self) -> LoopResult<()> {
        let viewport = self.host.viewport_height();
        self.scenes.set_viewport_height(viewport);
        self.bus.emit(Event::WindowResize);
        self.pump()?;
        let y = self.host.scroll_top();
        self.process_scroll(y, ScrollSource::Programmatic)
    }

    /// Advance the animation clock.
    pub fn tick(&mut self, now_ms: u64) -> LoopResult<()> {
        match self.scroll.tick(now_ms, &mut self.host, &mut self.bus) {
            Some(y) => self.process_scroll(y, ScrollSource::Programmatic),
            None => self.pump(),
        }
    }

    pub fn click_indicator(&mut self, link: usize) -> LoopResult<Option<f64>> {
        let mut p = self.parts();
        let target = p.indicator.click(link, &mut p.cx);
        self.pump()?;
        Ok(target)
    }

    pub fn click_arrow(&mut self) -> LoopResult<Option<f64>> {
        let mut p = self.parts();
        let target = p.arrow.click(&mut p.cx);
        self.pump()?;
        Ok(target)
    }

    /// Record every future `topic` event; see [`Engine::take_observed`].
    pub fn observe(&mut self, topic: Topic) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.bus.on(topic, Subscriber::Observer(id));
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) -> usize {
        self.bus.off_all(Subscriber::Observer(id))
    }

    pub fn take_observed(&mut self) -> Vec<(ObserverId, Event)> {
        std::mem::take(&mut self.observed)
    }

    /// Destroy every block. Returns how many were live.
    pub fn teardown(&mut self) -> usize {
        let mut p = self.parts();
        p.sequence.destroy_all(&mut p.cx)
    }

    fn process_scroll(&mut self, y: f64, source: ScrollSource) -> LoopResult<()> {
        let events = self.scenes.update(y);
        let mut p = self.parts();
        for ev in &events {
            if let Some(block) = p.sequence.block_mut(ev.owner.block) {
                block.on_scene(ev, &mut p.cx);
            }
        }
        for block in p.sequence.blocks_mut() {
            block.on_scroll(y, &mut p.cx);
        }
        let viewport = p.cx.host.viewport_height();
        p.indicator.on_scroll(y, viewport);
        p.arrow.on_scroll(source);
        p.sequence.retry_pending(&mut p.cx);
        self.pump()
    }

    /// Deliver queued events until the bus is quiet.
    fn pump(&mut self) -> LoopResult<()> {
        while let Some(event) = self.bus.next_event() {
            for target in self.bus.take_deliveries(&event) {
                self.deliver(target, &event);
            }
        }
        if self.config.strict_listener_bound {
            self.bus.audit()?;
        }
        Ok(())
    }

    fn deliver(&mut self, target: Subscriber, event: &Event) {
        let mut p = self.parts();
        match target {
            Subscriber::Sequence => p.sequence.handle_event(event, &mut p.cx),
            Subscriber::Block(index) => {
                let Some(block) = p.sequence.block_mut(index) else {
                    tracing::trace!(block = index.0, topic = %event.topic(), "no live block");
                    return;
                };
                if let Err(e) = block.on_event(event, &mut p.cx) {
                    tracing::warn!(block = index.0, error = %e, "block skipped event");
                }
            }
            Subscriber::Indicator => p.indicator.on_event(event, p.sequence.indices(), &*p.cx.host),
            Subscriber::ArrowButton => p.arrow.on_event(event, p.sequence),
            Subscriber::Observer(id) => p.observed.push((id, event.clone())),
        }
    }

    pub fn summary(&self) -> EngineSummary {
        let stats = self.sequence.stats();
        EngineSummary {
            live: self.sequence.live_range(),
            blocks: self.sequence.len(),
            duplicate_count: self.sequence.duplicate_count(),
            removed_count: self.sequence.removed_count(),
            duplications: stats.duplications,
            evictions: stats.evictions,
            deferrals: stats.deferrals,
            ignored: stats.ignored,
            scroll_top: self.host.scroll_top(),
            listeners: self.bus.active_count(),
            max_listeners: self.bus.max_listeners(),
            leak_signals: self.bus.leak_signals(),
            scenes: self.scenes.live_count(),
            events: self.bus.emitted(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Direct host access, e.g. to simulate a reflow before [`Engine::on_resize`].
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn scenes(&self) -> &SceneController {
        &self.scenes
    }

    pub fn scroll(&self) -> &ScrollCoordinator {
        &self.scroll
    }

    pub fn sequence(&self) -> &SequenceManager {
        &self.sequence
    }

    pub fn indicator(&self) -> &PositionIndicator {
        &self.indicator
    }

    pub fn arrow(&self) -> &ArrowDownButton {
        &self.arrow
    }

    pub fn balls(&self) -> &Balls {
        &self.balls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arrow::ArrowState, core::BlockIndex, model::TemplateBlock};

    fn page(n: usize, height: f64) -> PageSpec {
        PageSpec::new(
            (0..n)
                .map(|i| TemplateBlock::new(format!("s{i}"), height))
                .collect(),
        )
    }

    #[test]
    fn construction_initializes_and_syncs_dependents() {
        let engine = Engine::with_stack_layout(page(4, 900.0)).unwrap();
        assert_eq!(engine.sequence().len(), 4);
        assert_eq!(engine.indicator().waypoints().len(), 4);
        assert_eq!(engine.indicator().active(), Some(BlockIndex(0)));
        assert_eq!(engine.arrow().state(), ArrowState::Visible);
        assert_eq!(engine.arrow().target(), Some(BlockIndex(1)));
        // Block 0 is in view from the start.
        let s = engine.host().style(BlockIndex(0)).unwrap();
        assert!(s.in_view);
        assert!(!engine.bus().has_pending());
    }

    #[test]
    fn invalid_page_is_rejected() {
        assert!(Engine::with_stack_layout(page(0, 900.0)).is_err());
        assert!(Engine::with_stack_layout(page(2, -1.0)).is_err());
    }

    #[test]
    fn observers_see_topics_in_order() {
        let mut engine = Engine::with_stack_layout(page(3, 1_000.0)).unwrap();
        let id = engine.observe(Topic::BlockEnter);
        engine.on_scroll(1_000.0).unwrap();
        let seen = engine.take_observed();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|(o, e)| *o == id && e.topic() == Topic::BlockEnter));
        assert_eq!(engine.unobserve(id), 1);
        engine.on_scroll(0.0).unwrap();
        assert!(engine.take_observed().is_empty());
    }

    #[test]
    fn arrow_click_animates_and_advances() {
        let mut engine = Engine::with_stack_layout(page(4, 1_000.0)).unwrap();
        assert_eq!(engine.click_arrow().unwrap(), Some(1_000.0));
        assert!(engine.scroll().is_auto_scrolling());
        engine.tick(400).unwrap();
        engine.tick(800).unwrap();
        assert_eq!(engine.host().scroll_top(), 1_000.0);
        // Programmatic scrolling never dismisses the arrow.
        assert_eq!(engine.arrow().state(), ArrowState::Visible);
        engine.tick(1_100).unwrap();
        assert!(!engine.scroll().is_auto_scrolling());
        assert_eq!(engine.arrow().target(), Some(BlockIndex(2)));

        engine.on_scroll(1_200.0).unwrap();
        assert_eq!(engine.arrow().state(), ArrowState::Dismissed);
        assert_eq!(engine.click_arrow().unwrap(), None);
    }

    #[test]
    fn indicator_click_scrolls_to_waypoint() {
        let mut engine = Engine::with_stack_layout(page(4, 1_000.0)).unwrap();
        assert_eq!(engine.click_indicator(2).unwrap(), Some(2_000.0));
        engine.tick(1_000).unwrap();
        assert_eq!(engine.host().scroll_top(), 2_000.0);
        assert_eq!(engine.indicator().active(), Some(BlockIndex(2)));
        assert_eq!(engine.click_indicator(40).unwrap(), None);
    }

    #[test]
    fn strict_bound_surfaces_leaks() {
        let mut p = page(2, 1_000.0);
        p.config.strict_listener_bound = true;
        p.config.base_listeners = 0;
        p.config.listeners_per_block = 1;
        assert!(matches!(
            Engine::with_stack_layout(p),
            Err(crate::error::LoopError::Leak(_))
        ));
    }
}
