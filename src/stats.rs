//! Per-tier and overall queue statistics
//!
//! Counters and duration windows live inside the queue's state lock, so a
//! [`StatsSnapshot`] always reflects one consistent point in time. At
//! quiescence:
//!
//! `total_queued == total_processed + total_failed + total_cancelled
//!     + current_queue_depth (+1 while an item is in flight)`

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use crate::item::Outcome;
use crate::tier::{Tier, TierTable};

/// Ring buffer over the most recent duration samples
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Ring buffer for samples
    samples: Vec<Duration>,
    /// Next slot to overwrite
    position: usize,
    /// Number of valid samples
    count: usize,
    /// Sum of valid samples
    total: Duration,
}

impl SlidingWindow {
    /// Create a window holding up to `capacity` samples
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sliding window capacity must be > 0");
        Self {
            samples: vec![Duration::ZERO; capacity],
            position: 0,
            count: 0,
            total: Duration::ZERO,
        }
    }

    /// Record a sample, evicting the oldest once full
    pub fn add_sample(&mut self, value: Duration) {
        if self.count == self.samples.len() {
            self.total = self.total.saturating_sub(self.samples[self.position]);
        } else {
            self.count += 1;
        }
        self.samples[self.position] = value;
        self.total = self.total.saturating_add(value);
        self.position = (self.position + 1) % self.samples.len();
    }

    /// Mean of the retained samples, `None` when empty
    #[must_use]
    pub fn average(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        // count <= capacity, which is bounded by validated config
        let count = u32::try_from(self.count).unwrap_or(u32::MAX);
        Some(self.total / count)
    }

    /// Number of retained samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when no sample has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum number of retained samples
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
}

/// Counters for one tier, or for the whole queue
#[derive(Debug, Clone)]
struct Counters {
    queued: u64,
    processed: u64,
    failed: u64,
    cancelled: u64,
    durations: SlidingWindow,
    last_processed_at: Option<Instant>,
}

impl Counters {
    fn new(window: usize) -> Self {
        Self {
            queued: 0,
            processed: 0,
            failed: 0,
            cancelled: 0,
            durations: SlidingWindow::new(window),
            last_processed_at: None,
        }
    }

    fn finish(&mut self, outcome: Outcome, elapsed: Duration, now: Instant) {
        match outcome {
            Outcome::Completed => {
                self.processed += 1;
                self.durations.add_sample(elapsed);
                self.last_processed_at = Some(now);
            }
            Outcome::Failed => self.failed += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    fn tier_stats(&self, depth: usize) -> TierStats {
        TierStats {
            total_queued: self.queued,
            total_processed: self.processed,
            total_failed: self.failed,
            total_cancelled: self.cancelled,
            queue_depth: depth,
            average_processing_time: self.durations.average(),
            last_processed_at: self.last_processed_at,
        }
    }
}

/// Aggregates per-tier and overall counters
#[derive(Debug, Clone)]
pub(crate) struct StatsAggregator {
    overall: Counters,
    tiers: TierTable<Counters>,
}

impl StatsAggregator {
    pub(crate) fn new(process_time_window: usize) -> Self {
        Self {
            overall: Counters::new(process_time_window),
            tiers: TierTable::from_fn(|_| Counters::new(process_time_window)),
        }
    }

    pub(crate) fn record_queued(&mut self, tier: Tier) {
        self.overall.queued += 1;
        self.tiers[tier].queued += 1;
    }

    /// An item left the queue (or its run ended) as cancelled
    pub(crate) fn record_cancelled(&mut self, tier: Tier) {
        self.overall.cancelled += 1;
        self.tiers[tier].cancelled += 1;
    }

    pub(crate) fn record_finished(
        &mut self,
        tier: Tier,
        outcome: Outcome,
        elapsed: Duration,
        now: Instant,
    ) {
        self.overall.finish(outcome, elapsed, now);
        self.tiers[tier].finish(outcome, elapsed, now);
    }

    pub(crate) fn snapshot(
        &self,
        endpoint_key: &str,
        depths: TierTable<usize>,
        in_flight: Option<Tier>,
    ) -> StatsSnapshot {
        StatsSnapshot {
            endpoint_key: endpoint_key.to_string(),
            total_queued: self.overall.queued,
            total_processed: self.overall.processed,
            total_failed: self.overall.failed,
            total_cancelled: self.overall.cancelled,
            current_queue_depth: depths.iter().map(|(_, d)| *d).sum(),
            average_processing_time: self.overall.durations.average(),
            last_processed_at: self.overall.last_processed_at,
            current_processing_tier: in_flight,
            tiers: self.tiers.map(|tier, c| c.tier_stats(depths[tier])),
        }
    }
}

/// Statistics for a single tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierStats {
    /// Items admitted at this tier
    pub total_queued: u64,
    /// Items that completed successfully
    pub total_processed: u64,
    /// Items whose work function failed or panicked
    pub total_failed: u64,
    /// Items cancelled before or during execution
    pub total_cancelled: u64,
    /// Items of this tier currently waiting
    pub queue_depth: usize,
    /// Windowed mean of successful processing times
    pub average_processing_time: Option<Duration>,
    /// When an item of this tier last completed
    pub last_processed_at: Option<Instant>,
}

/// Point-in-time copy of a queue's statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Queue identifier
    pub endpoint_key: String,
    /// Items admitted
    pub total_queued: u64,
    /// Items that completed successfully
    pub total_processed: u64,
    /// Items whose work function failed or panicked
    pub total_failed: u64,
    /// Items cancelled before or during execution
    pub total_cancelled: u64,
    /// Items currently waiting
    pub current_queue_depth: usize,
    /// Windowed mean of successful processing times
    pub average_processing_time: Option<Duration>,
    /// When an item last completed
    pub last_processed_at: Option<Instant>,
    /// Tier of the in-flight item
    pub current_processing_tier: Option<Tier>,
    /// Per-tier breakdown
    pub tiers: TierTable<TierStats>,
}

impl StatsSnapshot {
    /// Items that reached a terminal state
    #[must_use]
    pub fn total_finished(&self) -> u64 {
        self.total_processed + self.total_failed + self.total_cancelled
    }

    /// True when every admitted item is accounted for
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let in_flight = u64::from(self.current_processing_tier.is_some());
        self.total_queued == self.total_finished() + self.current_queue_depth as u64 + in_flight
    }

    /// Fraction of finished items that failed
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let finished = self.total_finished();
        if finished == 0 {
            return 0.0;
        }
        self.total_failed as f64 / finished as f64
    }
}
