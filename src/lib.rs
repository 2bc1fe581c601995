//! Per-endpoint prioritized task queue
//!
//! This crate provides a task queue that serializes work through a single
//! dedicated worker thread while honouring a strict priority order, supports
//! bulk cancellation of queued work by tier, and keeps live statistics.
//!
//! # Features
//!
//! - **Tier-dominant ordering**: `Emergency > Critical > High > Normal > Low`,
//!   then numeric priority, then submission order
//! - **Submit and await**: [`PriorityTaskQueue::submit`] returns a
//!   [`TaskHandle`] that is both a `Future` and blockable
//! - **Cooperative cancellation**: per-item [`CancellationToken`]s,
//!   [`PriorityTaskQueue::cancel_tier`], and a bounded, idempotent shutdown
//! - **Windowed statistics**: per-tier counters and rolling processing-time
//!   averages in a consistent [`StatsSnapshot`]
//!
//! # Example
//!
//! ```no_run
//! use endpoint_queue::{PriorityTaskQueue, TaskError, Tier};
//! use tokio_util::sync::CancellationToken;
//!
//! let queue = PriorityTaskQueue::with_defaults("inventory");
//! let token = CancellationToken::new();
//!
//! let handle = queue.submit(
//!     |token| {
//!         if token.is_cancelled() {
//!             return Err(TaskError::Cancelled);
//!         }
//!         Ok("restocked")
//!     },
//!     10,
//!     Tier::High,
//!     &token,
//! )?;
//!
//! assert_eq!(handle.wait()?, "restocked");
//! # Ok::<(), TaskError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

/// Time sources
pub mod clock;
/// Queue configuration
pub mod config;
/// Error types
pub mod error;
/// Result handles
pub mod handle;
/// Observer hooks
pub mod hooks;
/// Work items and ordering
pub mod item;
/// Metrics export
#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;
/// The queue itself
pub mod queue;
mod ready_queue;
/// Keyed queue registry
pub mod registry;
/// Statistics
pub mod stats;
/// Priority tiers
pub mod tier;
mod worker;

// Public API exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::QueueConfig;
pub use error::{BoxError, QueueError, TaskError};
pub use handle::TaskHandle;
pub use hooks::{HookRegistry, NullHooks, QueueHooks};
pub use item::{CancelReason, OrderingKey, Outcome};
pub use queue::{PriorityTaskQueue, QueueBuilder, ShutdownOutcome};
pub use registry::QueueRegistry;
pub use stats::{SlidingWindow, StatsSnapshot, TierStats};
pub use tier::{Tier, TierTable};
pub use tokio_util::sync::CancellationToken;
