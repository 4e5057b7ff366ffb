use crate::{
    bus::{Event, EventBus, Subscriber, Topic},
    core::{Background, BlockIndex},
    cx::Cx,
    geometry::measure,
    scroll::ScrollSource,
    sequence::SequenceManager,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub enum ArrowState {
    #[default]
    Hidden,
    Visible,
    /// Hidden for good after the first user scroll.
    Dismissed,
}

/// "Scroll to next section" affordance.
#[derive(Debug, Default)]
pub struct ArrowDownButton {
    state: ArrowState,
    current: Option<BlockIndex>,
    target: Option<BlockIndex>,
    icon: Option<Background>,
}

impl ArrowDownButton {
    pub fn attach(&self, bus: &mut EventBus) {
        for topic in [
            Topic::BlocksInited,
            Topic::BlockEnter,
            Topic::ScrollAutoEnd,
            Topic::SequenceReset,
        ] {
            bus.on(topic, Subscriber::ArrowButton);
        }
    }

    pub fn state(&self) -> ArrowState {
        self.state
    }

    pub fn target(&self) -> Option<BlockIndex> {
        self.target
    }

    pub fn current(&self) -> Option<BlockIndex> {
        self.current
    }

    /// Icon colour, contrasting the background of the block behind the button.
    pub fn icon(&self) -> Option<Background> {
        self.icon
    }

    fn follow(&mut self, current: BlockIndex, sequence: &SequenceManager) {
        self.current = Some(current);
        self.icon = sequence
            .block(current)
            .and_then(|b| b.background())
            .map(Background::flip);
    }

    fn retarget(&mut self, sequence: &SequenceManager) {
        self.target = self
            .current
            .map(BlockIndex::next)
            .filter(|next| sequence.block(*next).is_some());
    }

    pub fn on_event(&mut self, event: &Event, sequence: &SequenceManager) {
        match event {
            Event::BlocksInited { live } => {
                if self.state == ArrowState::Hidden {
                    self.state = ArrowState::Visible;
                    self.follow(live.start, sequence);
                    self.retarget(sequence);
                }
            }
            Event::BlockEnter { index, .. } => self.follow(*index, sequence),
            Event::ScrollAutoEnd => self.retarget(sequence),
            Event::SequenceReset { live, .. } => {
                let current = self.current.filter(|c| live.contains(*c)).unwrap_or(live.start);
                self.follow(current, sequence);
                self.retarget(sequence);
            }
            _ => {}
        }
    }

    pub fn on_scroll(&mut self, source: ScrollSource) {
        if source == ScrollSource::User && self.state == ArrowState::Visible {
            self.state = ArrowState::Dismissed;
            tracing::debug!("arrow dismissed by user scroll");
        }
    }

    /// Scroll to the target block. Returns the offset scrolled to.
    pub fn click(&mut self, cx: &mut Cx<'_>) -> Option<f64> {
        if self.state != ArrowState::Visible {
            return None;
        }
        let target = self.target?;
        let top = match measure(&*cx.host, target) {
            Ok(m) => m.top,
            Err(e) => {
                tracing::debug!(block = target.0, error = %e, "arrow target not measurable");
                return None;
            }
        };
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
