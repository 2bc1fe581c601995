//! Per-endpoint prioritized task queue
//!
//! [`PriorityTaskQueue`] accepts work tagged with a [`Tier`] and a numeric
//! priority, runs it one item at a time on a dedicated worker thread, and
//! reports live statistics. All mutable state (ready queue, counters,
//! in-flight marker, shutdown flag) sits behind a single mutex, so snapshots
//! are never torn and concurrent submitters cannot corrupt ordering.
//!
//! # Example
//!
//! ```no_run
//! use endpoint_queue::{PriorityTaskQueue, Tier};
//! use tokio_util::sync::CancellationToken;
//!
//! let queue = PriorityTaskQueue::with_defaults("payments");
//! let handle = queue
//!     .submit(|_token| Ok(6 * 7), 1, Tier::Normal, &CancellationToken::new())
//!     .expect("admitted");
//!
//! assert_eq!(handle.wait().unwrap(), 42);
//! assert_eq!(queue.stats().total_processed, 1);
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::significant_drop_tightening)] // state guards are held for short sections

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::error::{QueueError, TaskError};
use crate::handle::TaskHandle;
use crate::hooks::{HookRegistry, QueueHooks};
use crate::item::{self, CancelReason, OrderingKey, WorkItem};
use crate::ready_queue::ReadyQueue;
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::tier::{Tier, TierTable};
use crate::worker::{self, WorkerState};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// State shared between the queue handle and its worker thread
pub(crate) struct Shared {
    pub(crate) endpoint_key: String,
    pub(crate) config: QueueConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) hooks: HookRegistry,
    pub(crate) state: Mutex<State>,
    /// Signalled on submit and on shutdown
    pub(crate) work_available: Condvar,
}

/// Everything mutable, guarded by `Shared::state`
pub(crate) struct State {
    pub(crate) ready: ReadyQueue,
    pub(crate) stats: StatsAggregator,
    pub(crate) in_flight: Option<InFlight>,
    /// Monotonic: false -> true
    pub(crate) shutting_down: bool,
    pub(crate) next_sequence: u64,
    pub(crate) worker: WorkerState,
}

/// The item currently running on the worker
pub(crate) struct InFlight {
    pub(crate) tier: Tier,
    pub(crate) token: CancellationToken,
}

/// How a call to [`PriorityTaskQueue::shutdown`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Worker exited, or was never started
    Completed,
    /// Worker did not exit within `shutdown_timeout`; it is left detached
    TimedOut,
    /// Requested from inside a work function; the worker exits once that
    /// function returns
    Deferred,
}

/// What a shutdown caller has to wait on
enum ExitWait {
    NeverStarted,
    OnWorker,
    Wait(Receiver<()>, Option<JoinHandle<()>>),
}

/// Prioritized, single-worker task queue for one endpoint
pub struct PriorityTaskQueue {
    shared: Arc<Shared>,
}

impl PriorityTaskQueue {
    /// Create a queue with a validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if `config` fails validation.
    pub fn new(endpoint_key: impl Into<String>, config: QueueConfig) -> Result<Self, QueueError> {
        Self::builder(endpoint_key).config(config).build()
    }

    /// Create a queue with the default configuration
    #[must_use]
    pub fn with_defaults(endpoint_key: impl Into<String>) -> Self {
        Self::from_parts(
            endpoint_key.into(),
            QueueConfig::default(),
            Arc::new(SystemClock),
            HookRegistry::new(),
        )
    }

    /// Start building a queue with a custom clock or hooks
    pub fn builder(endpoint_key: impl Into<String>) -> QueueBuilder {
        QueueBuilder::new(endpoint_key)
    }

    fn from_parts(
        endpoint_key: String,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        hooks: HookRegistry,
    ) -> Self {
        let state = State {
            ready: ReadyQueue::new(),
            stats: StatsAggregator::new(config.process_time_window),
            in_flight: None,
            shutting_down: false,
            next_sequence: 0,
            worker: WorkerState::NotStarted,
        };

        #[cfg(feature = "tracing")]
        debug!(
            endpoint = %endpoint_key,
            process_time_window = config.process_time_window,
            "Created priority task queue"
        );

        Self {
            shared: Arc::new(Shared {
                endpoint_key,
                config,
                clock,
                hooks,
                state: Mutex::new(state),
                work_available: Condvar::new(),
            }),
        }
    }

    /// Submit work for execution.
    ///
    /// The work function receives a token that fires when `token` is
    /// cancelled or when the queue shuts down while the work is running.
    /// Returning `Err(TaskError::Cancelled)` reports the run as cancelled;
    /// any other error, or a panic, reports it as failed.
    ///
    /// Returns immediately; the handle resolves when the work finishes.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Cancelled`] if `token` is already cancelled
    /// - [`TaskError::ShutDown`] if the queue is shutting down
    /// - [`TaskError::WorkerSpawn`] if the worker thread could not be started
    ///
    /// None of these admit the item or touch the statistics.
    pub fn submit<T, F>(
        &self,
        work: F,
        priority: i32,
        tier: Tier,
        token: &CancellationToken,
    ) -> Result<TaskHandle<T>, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> Result<T, TaskError> + Send + 'static,
    {
        if token.is_cancelled() {
            #[cfg(feature = "tracing")]
            debug!(
                endpoint = %self.shared.endpoint_key,
                tier = %tier,
                "Rejected submission with cancelled token"
            );
            return Err(TaskError::Cancelled);
        }

        let (job, receiver) = item::job(work);
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                return Err(TaskError::ShutDown(self.shared.endpoint_key.clone()));
            }
            if matches!(state.worker, WorkerState::NotStarted) {
                state.worker = worker::spawn(&self.shared).map_err(TaskError::WorkerSpawn)?;
            }

            let key = OrderingKey {
                tier,
                priority,
                submitted_at: self.shared.clock.now(),
                sequence: state.next_sequence,
            };
            state.next_sequence += 1;
            state.ready.push(WorkItem::new(key, token.child_token(), job));
            state.stats.record_queued(tier);

            #[cfg(feature = "tracing")]
            debug!(
                endpoint = %self.shared.endpoint_key,
                tier = %tier,
                priority = priority,
                queue_depth = state.ready.len(),
                "Item queued"
            );
        }
        self.shared.work_available.notify_one();
        self.shared
            .hooks
            .on_submit(&self.shared.endpoint_key, tier, priority);

        Ok(TaskHandle::new(receiver, tier, priority))
    }

    /// Cancel every queued item of `tier`.
    ///
    /// The in-flight item is never interrupted, and other tiers are not
    /// touched. Returns `true` if at least one item was removed.
    pub fn cancel_tier(&self, tier: Tier) -> bool {
        let removed = {
            let mut state = self.shared.state.lock();
            let removed = state.ready.remove_tier(tier);
            for _ in &removed {
                state.stats.record_cancelled(tier);
            }
            removed
        };

        if removed.is_empty() {
            return false;
        }

        #[cfg(feature = "tracing")]
        info!(
            endpoint = %self.shared.endpoint_key,
            tier = %tier,
            count = removed.len(),
            "Cancelled queued items"
        );

        self.resolve_cancelled(removed, CancelReason::Tier);
        true
    }

    /// Consistent copy of the queue's statistics
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.shared.state.lock();
        let depths = TierTable::from_fn(|tier| state.ready.len_of(tier));
        let in_flight = state.in_flight.as_ref().map(|f| f.tier);
        state
            .stats
            .snapshot(&self.shared.endpoint_key, depths, in_flight)
    }

    /// Stop the worker.
    ///
    /// Cancels the in-flight item's token (the work function must observe
    /// it), resolves every queued item as cancelled, and waits up to
    /// `shutdown_timeout` for the worker thread to exit. Idempotent and safe
    /// to call concurrently; every caller waits on the same exit signal.
    pub fn shutdown(&self) -> ShutdownOutcome {
        let (drained, worker) = {
            let mut state = self.shared.state.lock();
            if !state.shutting_down {
                state.shutting_down = true;

                #[cfg(feature = "tracing")]
                info!(
                    endpoint = %self.shared.endpoint_key,
                    queued = state.ready.len(),
                    in_flight = state.in_flight.is_some(),
                    "Shutting down priority task queue"
                );
            }
            if let Some(in_flight) = &state.in_flight {
                in_flight.token.cancel();
            }

            let drained = state.ready.drain();
            for item in &drained {
                state.stats.record_cancelled(item.tier());
            }

            let worker = match &mut state.worker {
                WorkerState::NotStarted => ExitWait::NeverStarted,
                WorkerState::Running { thread: worker_thread, .. }
                    if *worker_thread == thread::current().id() =>
                {
                    ExitWait::OnWorker
                }
                WorkerState::Running { exited, join, .. } => {
                    ExitWait::Wait(exited.clone(), join.take())
                }
            };
            (drained, worker)
        };
        self.shared.work_available.notify_all();
        self.resolve_cancelled(drained, CancelReason::Shutdown);

        let (exited, join) = match worker {
            ExitWait::NeverStarted => return ShutdownOutcome::Completed,
            ExitWait::OnWorker => return ShutdownOutcome::Deferred,
            ExitWait::Wait(exited, join) => (exited, join),
        };

        match exited.recv_timeout(self.shared.config.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(join) = join {
                    if join.join().is_err() {
                        #[cfg(feature = "tracing")]
                        warn!(endpoint = %self.shared.endpoint_key, "Worker thread panicked");
                    }
                }
                ShutdownOutcome::Completed
            }
            Err(RecvTimeoutError::Timeout) => {
                #[cfg(feature = "tracing")]
                warn!(
                    endpoint = %self.shared.endpoint_key,
                    timeout_ms = u64::try_from(self.shared.config.shutdown_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "Worker did not exit before shutdown timeout"
                );

                // Hand the join handle back so a later call can still reap it
                if let Some(join) = join {
                    if let WorkerState::Running { join: slot, .. } =
                        &mut self.shared.state.lock().worker
                    {
                        *slot = Some(join);
                    }
                }
                ShutdownOutcome::TimedOut
            }
        }
    }

    fn resolve_cancelled(&self, items: Vec<WorkItem>, reason: CancelReason) {
        for item in items {
            self.shared
                .hooks
                .on_cancel(&self.shared.endpoint_key, item.tier(), reason);
            item.cancel();
        }
    }

    /// Identifier this queue was created with
    #[must_use]
    pub fn endpoint_key(&self) -> &str {
        &self.shared.endpoint_key
    }

    /// Number of items waiting to run
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    /// True while a work function is running
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.shared.state.lock().in_flight.is_some()
    }

    /// True once `shutdown` has been called
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutting_down
    }

    /// True once the worker thread has been spawned
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(
            self.shared.state.lock().worker,
            WorkerState::Running { .. }
        )
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Install observer hooks, returning the previous ones
    pub fn set_hooks(&self, hooks: Arc<dyn QueueHooks>) -> Option<Arc<dyn QueueHooks>> {
        self.shared.hooks.set_hooks(hooks)
    }

    /// Remove observer hooks
    pub fn clear_hooks(&self) -> Option<Arc<dyn QueueHooks>> {
        self.shared.hooks.clear_hooks()
    }
}

impl std::fmt::Debug for PriorityTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityTaskQueue")
            .field("endpoint_key", &self.shared.endpoint_key)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Drop for PriorityTaskQueue {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Builder for [`PriorityTaskQueue`]
#[derive(Debug)]
pub struct QueueBuilder {
    endpoint_key: String,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    hooks: HookRegistry,
}

impl QueueBuilder {
    /// Start from the default configuration and the system clock
    pub fn new(endpoint_key: impl Into<String>) -> Self {
        Self {
            endpoint_key: endpoint_key.into(),
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
            hooks: HookRegistry::new(),
        }
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Samples kept for rolling averages
    #[must_use]
    pub fn process_time_window(mut self, samples: usize) -> Self {
        self.config.process_time_window = samples;
        self
    }

    /// Idle re-check interval of the worker
    #[must_use]
    pub fn idle_poll_interval(mut self, interval: Duration) -> Self {
        self.config.idle_poll_interval = interval;
        self
    }

    /// Bound on how long shutdown waits for the worker
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Time source for timestamps and durations
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Observer hooks installed from the start
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn QueueHooks>) -> Self {
        self.hooks = HookRegistry::with_hooks(hooks);
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<PriorityTaskQueue, QueueError> {
        self.config.validate()?;
        Ok(PriorityTaskQueue::from_parts(
            self.endpoint_key,
            self.config,
            self.clock,
            self.hooks,
        ))
    }
}
