//! Metrics export for queue activity
//!
//! With the `metrics` feature enabled, [`MetricsHooks`] forwards every queue
//! transition to the global `metrics` recorder. Install it on each queue you
//! want exported:
//!
//! ```no_run
//! use std::sync::Arc;
//! use endpoint_queue::{metrics::MetricsHooks, PriorityTaskQueue};
//!
//! endpoint_queue::metrics::init_metrics();
//! let queue = PriorityTaskQueue::builder("search")
//!     .hooks(Arc::new(MetricsHooks))
//!     .build()
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]

use std::time::Duration;

use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

use crate::hooks::QueueHooks;
use crate::item::{CancelReason, Outcome};
use crate::tier::Tier;

#[cfg(feature = "tracing")]
use tracing::info;

/// Items admitted, by endpoint and tier
pub const SUBMITTED_TOTAL: &str = "endpoint_queue_submitted_total";
/// Items whose work function ran, by endpoint, tier and outcome
pub const FINISHED_TOTAL: &str = "endpoint_queue_finished_total";
/// Queued items resolved without running, by endpoint, tier and reason
pub const CANCELLED_TOTAL: &str = "endpoint_queue_cancelled_total";
/// Work function run time in seconds, by endpoint and tier
pub const PROCESSING_SECONDS: &str = "endpoint_queue_processing_seconds";

/// `QueueHooks` implementation that records to the `metrics` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsHooks;

impl QueueHooks for MetricsHooks {
    fn on_submit(&self, endpoint: &str, tier: Tier, _priority: i32) {
        counter!(SUBMITTED_TOTAL, "endpoint" => endpoint.to_string(), "tier" => tier.as_str())
            .increment(1);
    }

    fn before_run(&self, _endpoint: &str, _tier: Tier) {}

    fn after_run(&self, endpoint: &str, tier: Tier, outcome: Outcome, elapsed: Duration) {
        let outcome = match outcome {
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
            Outcome::Cancelled => "cancelled",
        };
        counter!(
            FINISHED_TOTAL,
            "endpoint" => endpoint.to_string(),
            "tier" => tier.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(PROCESSING_SECONDS, "endpoint" => endpoint.to_string(), "tier" => tier.as_str())
            .record(elapsed.as_secs_f64());
    }

    fn on_cancel(&self, endpoint: &str, tier: Tier, reason: CancelReason) {
        counter!(
            CANCELLED_TOTAL,
            "endpoint" => endpoint.to_string(),
            "tier" => tier.as_str(),
            "reason" => reason.as_str()
        )
        .increment(1);
    }
}

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    #[cfg(feature = "tracing")]
    info!("Registering endpoint-queue metrics");

    describe_counter!(SUBMITTED_TOTAL, "Items admitted to a queue");
    describe_counter!(FINISHED_TOTAL, "Items whose work function ran");
    describe_counter!(CANCELLED_TOTAL, "Queued items resolved without running");
    describe_histogram!(
        PROCESSING_SECONDS,
        Unit::Seconds,
        "Work function run time"
    );
}
