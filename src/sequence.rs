//! Rendered block collection: duplication near the tail, eviction at the head.
//!
//! Live indices are always
//! `[removed_count, removed_count + template_len * (duplicate_count + 1))`, so a block
//! is found by offset from the head, without a search.

use std::collections::VecDeque;

use crate::{
    block::ContentBlock,
    bus::{Event, Subscriber, SubscriptionId, Topic},
    core::{Background, BlockIndex, BlockRange},
    cx::Cx,
    error::{LoopError, LoopResult},
    geometry::{VisualEffect, measure},
    model::TemplateBlock,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum DeferReason {
    AutoScroll,
    Geometry,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub enum EvictOutcome {
    Evicted {
        range: BlockRange,
        compensated: f64,
    },
    Deferred(DeferReason),
    Nothing,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub enum DuplicateOutcome {
    /// Stale request: the block is gone or no longer the physical tail.
    Ignored,
    /// An eviction is pending; the request is replayed once it completes.
    Queued,
    Appended {
        range: BlockRange,
        eviction: Option<EvictOutcome>,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SequenceStats {
    pub duplications: u64,
    pub evictions: u64,
    pub deferrals: u64,
    pub ignored: u64,
    pub resets: u64,
}

#[derive(Clone, Copy, Debug)]
struct PendingEviction {
    reason: DeferReason,
    subscription: Option<SubscriptionId>,
}

#[derive(Debug)]
pub struct SequenceManager {
    template: Vec<TemplateBlock>,
    blocks: VecDeque<ContentBlock>,
    removed_count: u64,
    duplicate_count: u32,
    duplicate_limit: u32,
    pending: Option<PendingEviction>,
    queued_duplicate: Option<BlockIndex>,
    initialized: bool,
    stats: SequenceStats,
}

impl SequenceManager {
    pub fn new(duplicate_limit: u32) -> Self {
        Self {
            template: Vec::new(),
            blocks: VecDeque::new(),
            removed_count: 0,
            duplicate_count: 0,
            duplicate_limit,
            pending: None,
            queued_duplicate: None,
            initialized: false,
            stats: SequenceStats::default(),
        }
    }

    pub fn template_len(&self) -> usize {
        self.template.len()
    }

    pub fn removed_count(&self) -> u64 {
        self.removed_count
    }

    pub fn duplicate_count(&self) -> u32 {
        self.duplicate_count
    }

    pub fn duplicate_limit(&self) -> u32 {
        self.duplicate_limit
    }

    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    pub fn pending_eviction(&self) -> Option<DeferReason> {
        self.pending.map(|p| p.reason)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn live_range(&self) -> BlockRange {
        let start = BlockIndex(self.removed_count);
        BlockRange {
            start,
            end: BlockIndex(self.removed_count + self.blocks.len() as u64),
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.blocks.iter()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut ContentBlock> {
        self.blocks.iter_mut()
    }

    pub fn indices(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.blocks.iter().map(ContentBlock::index)
    }

    fn position(&self, index: BlockIndex) -> Option<usize> {
        let pos = index.0.checked_sub(self.removed_count)? as usize;
        (pos < self.blocks.len()).then_some(pos)
    }

    pub fn block(&self, index: BlockIndex) -> Option<&ContentBlock> {
        self.position(index).map(|p| &self.blocks[p])
    }

    pub fn block_mut(&mut self, index: BlockIndex) -> Option<&mut ContentBlock> {
        self.position(index).map(|p| &mut self.blocks[p])
    }

    pub fn tail(&self) -> Option<&ContentBlock> {
        self.blocks.back()
    }

    #[tracing::instrument(skip_all, fields(template_len = template.len()))]
    pub fn initialize(
        &mut self,
        template: Vec<TemplateBlock>,
        cx: &mut Cx<'_>,
    ) -> LoopResult<()> {
        if self.initialized {
            return Err(LoopError::lifecycle("sequence already initialized"));
        }
        if template.is_empty() {
            return Err(LoopError::validation("template must contain at least one block"));
        }
        self.template = template;
        self.initialized = true;
        cx.bus.on(Topic::SequenceDuplicate, Subscriber::Sequence);
        cx.bus.on(Topic::WindowResize, Subscriber::Sequence);

        let range = self.append_copy(cx);
        self.update_listener_bound(cx);
        tracing::debug!(start = range.start.0, end = range.end.0, "sequence initialized");
        cx.bus.emit(Event::BlocksInited { live: range });
        Ok(())
    }

    /// Stamp one more template copy after the current tail and bind it.
    fn append_copy(&mut self, cx: &mut Cx<'_>) -> BlockRange {
        let len = self.template.len();
        let start = self.live_range().end;
        cx.bus
            .set_max_listeners(cx.config.listener_bound(self.blocks.len() + len));

        let mut previous: Option<(BlockIndex, Option<Background>)> =
            self.blocks.back().map(|b| (b.index(), b.background()));
        let mut index = start;
        for template in &self.template {
            cx.host.mount(index, template);
            cx.host.apply(index, VisualEffect::Anchor(index.anchor()));
            let mut block = ContentBlock::new(index, template, len);
            block.set_previous(previous.map(|(i, _)| i));
            let bg = block.assign_background(previous.and_then(|(_, bg)| bg), cx);
            previous = Some((index, Some(bg)));
            self.blocks.push_back(block);
            index = index.next();
        }

        // Bind only after the whole copy is mounted so geometry reads are settled.
        for block in self.blocks.iter_mut().skip_while(|b| b.index() < start) {
            if let Err(e) = block.bind_trigger(cx) {
                tracing::warn!(block = block.index().0, error = %e, "trigger deferred");
            }
        }
        self.mark_tail();
        BlockRange { start, end: index }
    }

    fn mark_tail(&mut self) {
        let last = self.blocks.len().saturating_sub(1);
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.set_last(i == last);
        }
    }

    fn update_listener_bound(&self, cx: &mut Cx<'_>) {
        cx.bus
            .set_max_listeners(cx.config.listener_bound(self.blocks.len()));
    }

    /// Advance the bus generation and tell every dependent to resynchronize.
    fn publish_reset(&mut self, cx: &mut Cx<'_>) {
        let generation = cx.bus.advance_generation();
        let swept = cx.bus.compact();
        self.update_listener_bound(cx);
        self.stats.resets += 1;
        tracing::debug!(generation = generation.0, swept, "sequence reset");
        cx.bus.emit(Event::SequenceReset {
            generation,
            live: self.live_range(),
        });
    }

    #[tracing::instrument(skip_all, fields(index = index.0))]
    pub fn on_duplicate_requested(
        &mut self,
        index: BlockIndex,
        cx: &mut Cx<'_>,
    ) -> DuplicateOutcome {
        let is_tail = self.tail().is_some_and(|t| t.index() == index && t.is_last());
        if !is_tail {
            self.stats.ignored += 1;
            tracing::debug!("duplicate request for a block that is not the tail");
            return DuplicateOutcome::Ignored;
        }
        if self.pending.is_some() {
            self.queued_duplicate = Some(index);
            tracing::debug!("duplicate queued behind pending eviction");
            return DuplicateOutcome::Queued;
        }

        let range = self.append_copy(cx);
        self.duplicate_count += 1;
        self.stats.duplications += 1;
        tracing::info!(
            start = range.start.0,
            end = range.end.0,
            duplicates = self.duplicate_count,
            "copy appended"
        );

        let eviction = (self.duplicate_count >= self.duplicate_limit)
            .then(|| self.evict_oldest_copy(cx));
        self.publish_reset(cx);
        DuplicateOutcome::Appended { range, eviction }
    }

    /// Destroy the oldest template copy, compensating the scroll offset block by block.
    #[tracing::instrument(skip_all, fields(removed = self.removed_count))]
    pub fn evict_oldest_copy(&mut self, cx: &mut Cx<'_>) -> EvictOutcome {
        if self.duplicate_count == 0 {
            return EvictOutcome::Nothing;
        }
        let len = self.template.len();

        if cx.scroll.is_auto_scrolling() {
            if self.pending.is_none_or(|p| p.reason != DeferReason::AutoScroll) {
                let subscription = cx.bus.once(Topic::ScrollAutoEnd, Subscriber::Sequence);
                self.pending = Some(PendingEviction {
                    reason: DeferReason::AutoScroll,
                    subscription: Some(subscription),
                });
                self.stats.deferrals += 1;
                tracing::debug!("eviction deferred until auto scroll ends");
            }
            return EvictOutcome::Deferred(DeferReason::AutoScroll);
        }

        let settled: LoopResult<Vec<f64>> = self
            .blocks
            .iter()
            .take(len)
            .map(|b| measure(&*cx.host, b.index()).map(|m| m.height))
            .collect();
        let settled = match settled {
            Ok(heights) => heights,
            Err(e) => {
                if self.pending.is_none_or(|p| p.reason != DeferReason::Geometry) {
                    self.stats.deferrals += 1;
                }
                self.clear_pending(cx);
                self.pending = Some(PendingEviction {
                    reason: DeferReason::Geometry,
                    subscription: None,
                });
                tracing::warn!(error = %e, "eviction deferred");
                return EvictOutcome::Deferred(DeferReason::Geometry);
            }
        };
        self.clear_pending(cx);

        let start = BlockIndex(self.removed_count);
        let mut compensated = 0.0;
        for fallback in settled {
            let Some(mut block) = self.blocks.pop_front() else {
                break;
            };
            let before = cx.host.scroll_top();
            // Re-read per block: earlier removals may have reflowed this one.
            let height = match measure(&*cx.host, block.index()) {
                Ok(m) => m.height,
                Err(e) => {
                    tracing::warn!(
                        block = block.index().0,
                        error = %e,
                        fallback,
                        "geometry lost mid-eviction, using the height measured before it"
                    );
                    fallback
                }
            };
            block.destroy(cx);
            cx.host.set_scroll_top(before - height);
            compensated += height;
            self.removed_count += 1;
        }
        self.duplicate_count -= 1;
        self.stats.evictions += 1;

        let y = cx.host.scroll_top();
        cx.scroll.note_programmatic(y);
        cx.scenes.sync_scroll(y);

        if let Some(head) = self.blocks.front_mut() {
            head.set_previous(None);
        }
        self.rebase_triggers(cx);
        self.update_listener_bound(cx);

        let range = BlockRange {
            start,
            end: BlockIndex(self.removed_count),
        };
        tracing::info!(
            start = range.start.0,
            end = range.end.0,
            compensated,
            scroll_top = y,
            "oldest copy evicted"
        );
        EvictOutcome::Evicted { range, compensated }
    }

    fn clear_pending(&mut self, cx: &mut Cx<'_>) {
        if let Some(PendingEviction {
            subscription: Some(id),
            ..
        }) = self.pending.take()
        {
            cx.bus.off(id);
        }
    }

    fn rebase_triggers(&mut self, cx: &mut Cx<'_>) {
        for block in &mut self.blocks {
            if let Err(e) = block.refresh_trigger(cx) {
                tracing::warn!(block = block.index().0, error = %e, "trigger not rebased");
            }
        }
    }

    /// Run a deferred eviction whose precondition may now hold, then replay a queued
    /// duplication.
    fn resume_pending(&mut self, cx: &mut Cx<'_>) -> Option<EvictOutcome> {
        if self.pending.is_none() {
            return None;
        }
        let outcome = self.evict_oldest_copy(cx);
        if let EvictOutcome::Evicted { .. } = outcome {
            if let Some(index) = self.queued_duplicate.take() {
                self.on_duplicate_requested(index, cx);
            } else {
                self.publish_reset(cx);
            }
        }
        Some(outcome)
    }

    /// Retry an eviction deferred for missing geometry. Called on every scroll.
    pub fn retry_pending(&mut self, cx: &mut Cx<'_>) -> Option<EvictOutcome> {
        match self.pending {
            Some(PendingEviction {
                reason: DeferReason::Geometry,
                ..
            }) => self.resume_pending(cx),
            _ => None,
        }
    }

    #[tracing::instrument(skip_all, fields(blocks = self.blocks.len()))]
    pub fn on_resize(&mut self, cx: &mut Cx<'_>) {
        for block in &mut self.blocks {
            if let Err(e) = block.refresh(cx) {
                tracing::warn!(block = block.index().0, error = %e, "resize refresh skipped");
            }
        }
        self.retry_pending(cx);
    }

    pub fn handle_event(&mut self, event: &Event, cx: &mut Cx<'_>) {
        match event {
            Event::SequenceDuplicate { index } => {
                self.on_duplicate_requested(*index, cx);
            }
            Event::ScrollAutoEnd => {
                if let Some(p) = self.pending.as_mut()
                    && p.reason == DeferReason::AutoScroll
                {
                    // The `once` subscription has just been consumed.
                    p.subscription = None;
                    self.resume_pending(cx);
                }
            }
            Event::WindowResize => self.on_resize(cx),
            _ => {}
        }
    }

    /// Tear down every block. Used when the engine is dropped or rebuilt.
    pub fn destroy_all(&mut self, cx: &mut Cx<'_>) -> usize {
        self.clear_pending(cx);
        self.queued_duplicate = None;
        let mut destroyed = 0;
        while let Some(mut block) = self.blocks.pop_front() {
            destroyed += usize::from(block.destroy(cx));
            self.removed_count += 1;
        }
        destroyed
    }
}
