//! Process-wide publish/subscribe channel.
//!
//! Components never hold references to each other; they address the bus by [`Topic`] and
//! are addressed back by [`Subscriber`]. Emission is queued: [`EventBus::emit`] only
//! records the event, and the owning runtime drains the queue with
//! [`EventBus::next_event`] + [`EventBus::take_deliveries`], so a handler that emits
//! while being dispatched never re-enters another handler.
//!
//! Subscriptions may be *versioned*: they capture the bus [`Generation`] at registration
//! and are skipped once a `sequence:reset` advances it. Stale entries are swept by
//! [`EventBus::compact`] instead of being torn down synchronously.

use std::collections::{BTreeMap, VecDeque};

use crate::{
    core::{BlockIndex, BlockRange, Generation, ScrollDirection},
    error::{LoopError, LoopResult},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum Topic {
    BlockEnter,
    BlockLeave,
    SequenceDuplicate,
    SequenceReset,
    ScrollAutoStart,
    ScrollAutoEnd,
    WindowResize,
    BlocksInited,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlockEnter => "block:enter",
            Self::BlockLeave => "block:leave",
            Self::SequenceDuplicate => "sequence:duplicate",
            Self::SequenceReset => "sequence:reset",
            Self::ScrollAutoStart => "scroll:autoStart",
            Self::ScrollAutoEnd => "scroll:autoEnd",
            Self::WindowResize => "window:resize",
            Self::BlocksInited => "sections:inited",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub enum Event {
    BlockEnter {
        index: BlockIndex,
        direction: ScrollDirection,
    },
    BlockLeave {
        index: BlockIndex,
        direction: ScrollDirection,
    },
    SequenceDuplicate {
        index: BlockIndex,
    },
    SequenceReset {
        generation: Generation,
        live: BlockRange,
    },
    ScrollAutoStart,
    ScrollAutoEnd,
    WindowResize,
    BlocksInited {
        live: BlockRange,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::BlockEnter { .. } => Topic::BlockEnter,
            Self::BlockLeave { .. } => Topic::BlockLeave,
            Self::SequenceDuplicate { .. } => Topic::SequenceDuplicate,
            Self::SequenceReset { .. } => Topic::SequenceReset,
            Self::ScrollAutoStart => Topic::ScrollAutoStart,
            Self::ScrollAutoEnd => Topic::ScrollAutoEnd,
            Self::WindowResize => Topic::WindowResize,
            Self::BlocksInited { .. } => Topic::BlocksInited,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u32);

/// Addressable receivers known to the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subscriber {
    Sequence,
    Block(BlockIndex),
    Indicator,
    ArrowButton,
    Observer(ObserverId),
}

#[derive(Clone, Copy, Debug)]
struct Listener {
    topic: Topic,
    subscriber: Subscriber,
    once: bool,
    generation: Option<Generation>,
}

#[derive(Debug)]
pub struct EventBus {
    next_id: u64,
    // Ordered by id, so dispatch follows registration order.
    listeners: BTreeMap<SubscriptionId, Listener>,
    queue: VecDeque<Event>,
    generation: Generation,
    max_listeners: usize,
    leak_signals: u64,
    emitted: u64,
}

impl EventBus {
    pub fn new(max_listeners: usize) -> Self {
        Self {
            next_id: 0,
            listeners: BTreeMap::new(),
            queue: VecDeque::new(),
            generation: Generation::default(),
            max_listeners,
            leak_signals: 0,
            emitted: 0,
        }
    }

    /// Persistent subscription; survives `sequence:reset`.
    pub fn on(&mut self, topic: Topic, subscriber: Subscriber) -> SubscriptionId {
        self.register(topic, subscriber, false, None)
    }

    /// Subscription that lapses at the next generation bump.
    pub fn on_versioned(&mut self, topic: Topic, subscriber: Subscriber) -> SubscriptionId {
        self.register(topic, subscriber, false, Some(self.generation))
    }

    /// Subscription removed after its first delivery.
    pub fn once(&mut self, topic: Topic, subscriber: Subscriber) -> SubscriptionId {
        self.register(topic, subscriber, true, None)
    }

    fn register(
        &mut self,
        topic: Topic,
        subscriber: Subscriber,
        once: bool,
        generation: Option<Generation>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.insert(
            id,
            Listener {
                topic,
                subscriber,
                once,
                generation,
            },
        );
        let active = self.active_count();
        if active > self.max_listeners {
            self.leak_signals += 1;
            tracing::warn!(
                topic = topic.as_str(),
                ?subscriber,
                active,
                max = self.max_listeners,
                "listener count exceeds bound"
            );
        }
        id
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Drop every subscription (live or stale) held by `subscriber`.
    pub fn off_all(&mut self, subscriber: Subscriber) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|_, l| l.subscriber != subscriber);
        before - self.listeners.len()
    }

    pub fn emit(&mut self, event: Event) {
        tracing::trace!(topic = event.topic().as_str(), ?event, "emit");
        self.emitted += 1;
        self.queue.push_back(event);
    }

    pub fn next_event(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Resolve who receives `event`, consuming `once` subscriptions and skipping stale
    /// versioned ones.
    pub fn take_deliveries(&mut self, event: &Event) -> Vec<Subscriber> {
        let topic = event.topic();
        let generation = self.generation;
        let mut out = Vec::new();
        let mut spent = Vec::new();
        for (id, l) in &self.listeners {
            if l.topic != topic || l.generation.is_some_and(|g| g != generation) {
                continue;
            }
            out.push(l.subscriber);
            if l.once {
                spent.push(*id);
            }
        }
        for id in spent {
            self.listeners.remove(&id);
        }
        out
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn advance_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        tracing::debug!(generation = self.generation.0, "bus generation advanced");
        self.generation
    }

    /// Remove versioned subscriptions captured under an older generation.
    pub fn compact(&mut self) -> usize {
        let generation = self.generation;
        let before = self.listeners.len();
        self.listeners
            .retain(|_, l| l.generation.is_none_or(|g| g == generation));
        before - self.listeners.len()
    }

    pub fn set_max_listeners(&mut self, max: usize) {
        self.max_listeners = max;
    }

    pub fn max_listeners(&self) -> usize {
        self.max_listeners
    }

    /// Live (non-stale) subscriptions.
    pub fn active_count(&self) -> usize {
        let generation = self.generation;
        self.listeners
            .values()
            .filter(|l| l.generation.is_none_or(|g| g == generation))
            .count()
    }

    pub fn count_for(&self, subscriber: Subscriber) -> usize {
        let generation = self.generation;
        self.listeners
            .values()
            .filter(|l| l.subscriber == subscriber && l.generation.is_none_or(|g| g == generation))
            .count()
    }

    pub fn count_topic(&self, topic: Topic) -> usize {
        let generation = self.generation;
        self.listeners
            .values()
            .filter(|l| l.topic == topic && l.generation.is_none_or(|g| g == generation))
            .count()
    }

    pub fn leak_signals(&self) -> u64 {
        self.leak_signals
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Fails when the live subscriber count is above the current bound.
    pub fn audit(&self) -> LoopResult<()> {
        let active = self.active_count();
        if active > self.max_listeners {
            return Err(LoopError::leak(format!(
                "{active} live listeners exceed bound of {}",
                self.max_listeners
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter(i: u64) -> Event {
        Event::BlockEnter {
            index: BlockIndex(i),
            direction: ScrollDirection::Forward,
        }
    }

    #[test]
    fn delivers_in_registration_order_by_topic() {
        let mut bus = EventBus::new(16);
        bus.on(Topic::BlockEnter, Subscriber::Indicator);
        bus.on(Topic::BlockLeave, Subscriber::ArrowButton);
        bus.on(Topic::BlockEnter, Subscriber::Sequence);

        bus.emit(enter(0));
        let ev = bus.next_event().unwrap();
        assert_eq!(ev.topic(), Topic::BlockEnter);
        assert_eq!(
            bus.take_deliveries(&ev),
            vec![Subscriber::Indicator, Subscriber::Sequence]
        );
        assert!(bus.next_event().is_none());
    }

    #[test]
    fn once_is_consumed_by_first_delivery() {
        let mut bus = EventBus::new(16);
        bus.once(Topic::ScrollAutoEnd, Subscriber::Sequence);
        assert_eq!(bus.count_topic(Topic::ScrollAutoEnd), 1);
        assert_eq!(
            bus.take_deliveries(&Event::ScrollAutoEnd),
            vec![Subscriber::Sequence]
        );
        assert!(bus.take_deliveries(&Event::ScrollAutoEnd).is_empty());
        assert_eq!(bus.active_count(), 0);
    }

    #[test]
    fn versioned_subscriptions_lapse_on_generation_bump() {
        let mut bus = EventBus::new(16);
        let block = Subscriber::Block(BlockIndex(3));
        bus.on_versioned(Topic::BlockLeave, block);
        bus.on(Topic::SequenceReset, block);
        assert_eq!(bus.count_for(block), 2);

        bus.advance_generation();
        assert_eq!(bus.count_for(block), 1);
        let leave = Event::BlockLeave {
            index: BlockIndex(3),
            direction: ScrollDirection::Forward,
        };
        assert!(bus.take_deliveries(&leave).is_empty());

        assert_eq!(bus.compact(), 1);
        bus.on_versioned(Topic::BlockLeave, block);
        assert_eq!(bus.take_deliveries(&leave), vec![block]);
    }

    #[test]
    fn off_all_releases_stale_and_live_entries() {
        let mut bus = EventBus::new(16);
        let block = Subscriber::Block(BlockIndex(1));
        bus.on_versioned(Topic::BlockLeave, block);
        bus.advance_generation();
        bus.on(Topic::SequenceReset, block);
        bus.on(Topic::SequenceReset, Subscriber::Indicator);
        assert_eq!(bus.off_all(block), 2);
        assert_eq!(bus.count_for(block), 0);
        assert_eq!(bus.active_count(), 1);
        assert_eq!(bus.off_all(block), 0);
    }

    #[test]
    fn exceeding_the_bound_is_signalled() {
        let mut bus = EventBus::new(2);
        bus.on(Topic::WindowResize, Subscriber::Indicator);
        bus.on(Topic::WindowResize, Subscriber::ArrowButton);
        assert_eq!(bus.leak_signals(), 0);
        bus.audit().unwrap();

        let extra = bus.on(Topic::WindowResize, Subscriber::Sequence);
        assert_eq!(bus.leak_signals(), 1);
        assert!(matches!(bus.audit(), Err(LoopError::Leak(_))));

        assert!(bus.off(extra));
        assert!(!bus.off(extra));
        bus.audit().unwrap();
    }

    #[test]
    fn topic_names_are_stable() {
        assert_eq!(Topic::BlockEnter.to_string(), "block:enter");
        assert_eq!(Topic::SequenceDuplicate.as_str(), "sequence:duplicate");
        assert_eq!(Topic::ScrollAutoEnd.as_str(), "scroll:autoEnd");
    }
}
