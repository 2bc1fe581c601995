//! Ready queue of not-yet-started work items
//!
//! Items are kept in one max-heap per tier. Popping scans tiers from
//! `Emergency` down, which makes tier dominance structural, and cancelling a
//! tier is a single heap swap. The queue is not synchronized on its own; the
//! owning queue guards it with its state lock.

#![forbid(unsafe_code)]

use std::collections::BinaryHeap;

use crate::item::WorkItem;
use crate::tier::{Tier, TierTable};

#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    heaps: TierTable<BinaryHeap<WorkItem>>,
    len: usize,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, item: WorkItem) {
        self.heaps[item.tier()].push(item);
        self.len += 1;
    }

    /// Remove the best-ranked item across all tiers
    pub(crate) fn pop_best(&mut self) -> Option<WorkItem> {
        for tier in Tier::highest_first() {
            if let Some(item) = self.heaps[tier].pop() {
                self.len -= 1;
                return Some(item);
            }
        }
        None
    }

    /// Remove every queued item of `tier`, best-ranked first
    pub(crate) fn remove_tier(&mut self, tier: Tier) -> Vec<WorkItem> {
        let heap = std::mem::take(&mut self.heaps[tier]);
        self.len -= heap.len();
        heap.into_sorted_vec().into_iter().rev().collect()
    }

    /// Remove everything, best-ranked first
    pub(crate) fn drain(&mut self) -> Vec<WorkItem> {
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = self.pop_best() {
            items.push(item);
        }
        items
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn len_of(&self, tier: Tier) -> usize {
        self.heaps[tier].len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }
}
