//! Dedicated worker thread of a queue
//!
//! Each queue owns one worker thread, spawned on first submit. The loop pops
//! the best-ranked item, runs it to completion, records the outcome and pops
//! again. With nothing queued it waits on the queue's condvar for at most
//! `idle_poll_interval`, so the shutdown flag is re-checked even without a
//! wake-up. The loop exits as soon as it observes the flag.

#![forbid(unsafe_code)]

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::MutexGuard;

use crate::item::{CancelReason, Outcome, WorkItem};
use crate::queue::{InFlight, Shared, State};

#[cfg(feature = "tracing")]
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

#[cfg(feature = "tracing")]
use crate::{error::TaskError, item::OrderingKey};

/// Lifecycle of a queue's worker thread
#[derive(Debug)]
pub(crate) enum WorkerState {
    /// No item has been submitted yet
    NotStarted,
    /// Thread spawned; `exited` disconnects when it returns
    Running {
        exited: Receiver<()>,
        join: Option<JoinHandle<()>>,
        thread: ThreadId,
    },
}

/// Spawn the worker thread for `shared`.
///
/// Called with the state lock held; the thread blocks on that lock until the
/// caller releases it.
pub(crate) fn spawn(shared: &Arc<Shared>) -> io::Result<WorkerState> {
    let (exit_signal, exited) = channel::bounded::<()>(1);
    let thread_name = format!(
        "{}-{}",
        shared.config.thread_name_prefix,
        shared.endpoint_key.replace('\0', "")
    );
    let worker_shared = Arc::clone(shared);

    let join = thread::Builder::new()
        .name(thread_name)
        .spawn(move || run(worker_shared, exit_signal))?;
    let thread = join.thread().id();

    Ok(WorkerState::Running {
        exited,
        join: Some(join),
        thread,
    })
}

fn run(shared: Arc<Shared>, exit_signal: Sender<()>) {
    // Dropped on return or unwind, waking every shutdown waiter
    let _exit_signal = exit_signal;

    #[cfg(feature = "tracing")]
    info!(endpoint = %shared.endpoint_key, "Worker thread started");

    while let Some(item) = next_item(&shared) {
        process(&shared, item);
    }

    #[cfg(feature = "tracing")]
    info!(endpoint = %shared.endpoint_key, "Worker thread exiting");
}

/// Block until an item is ready to run or shutdown is requested
fn next_item(shared: &Shared) -> Option<WorkItem> {
    let mut state = shared.state.lock();
    loop {
        if state.shutting_down {
            return None;
        }

        match state.ready.pop_best() {
            Some(item) if item.is_cancelled() => {
                state.stats.record_cancelled(item.tier());
                MutexGuard::unlocked(&mut state, || {
                    drop_cancelled(shared, item);
                });
            }
            Some(item) => {
                state.in_flight = Some(InFlight {
                    tier: item.tier(),
                    token: item.token().clone(),
                });
                return Some(item);
            }
            None => {
                wait_for_work(shared, &mut state);
            }
        }
    }
}

fn wait_for_work(shared: &Shared, state: &mut MutexGuard<'_, State>) {
    // Timeout is not an error: loop and re-check the shutdown flag
    let _ = shared
        .work_available
        .wait_for(state, shared.config.idle_poll_interval);
}

fn drop_cancelled(shared: &Shared, item: WorkItem) {
    #[cfg(feature = "tracing")]
    debug!(
        endpoint = %shared.endpoint_key,
        tier = %item.tier(),
        priority = item.key().priority,
        "Skipping item cancelled while queued"
    );

    shared
        .hooks
        .on_cancel(&shared.endpoint_key, item.tier(), CancelReason::Token);
    item.cancel();
}

/// Run one item outside the lock, then record and resolve it
fn process(shared: &Shared, item: WorkItem) {
    let (key, token, mut job) = item.into_parts();

    #[cfg(feature = "tracing")]
    debug!(
        endpoint = %shared.endpoint_key,
        tier = %key.tier,
        priority = key.priority,
        wait_us = micros(shared.clock.now().saturating_duration_since(key.submitted_at)),
        "Processing item"
    );

    shared.hooks.before_run(&shared.endpoint_key, key.tier);

    let started = shared.clock.now();
    let outcome = job.run(&token);
    let finished = shared.clock.now();
    let elapsed = finished.saturating_duration_since(started);

    #[cfg(feature = "tracing")]
    log_outcome(shared, &key, outcome, elapsed, job.error());

    {
        let mut state = shared.state.lock();
        state.stats.record_finished(key.tier, outcome, elapsed, finished);
        state.in_flight = None;
    }

    // Resolve first so a misbehaving hook cannot hold up the caller
    job.resolve();
    shared
        .hooks
        .after_run(&shared.endpoint_key, key.tier, outcome, elapsed);
}

#[cfg(feature = "tracing")]
fn log_outcome(
    shared: &Shared,
    key: &OrderingKey,
    outcome: Outcome,
    elapsed: Duration,
    error: Option<&TaskError>,
) {
    match outcome {
        Outcome::Completed => debug!(
            endpoint = %shared.endpoint_key,
            tier = %key.tier,
            elapsed_us = micros(elapsed),
            "Item completed"
        ),
        Outcome::Failed => warn!(
            endpoint = %shared.endpoint_key,
            tier = %key.tier,
            elapsed_us = micros(elapsed),
            error = %error.map(ToString::to_string).unwrap_or_default(),
            "Item failed"
        ),
        Outcome::Cancelled => debug!(
            endpoint = %shared.endpoint_key,
            tier = %key.tier,
            "Item cancelled during execution"
        ),
    }
}

#[cfg(feature = "tracing")]
fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(all(test, feature = "tracing"))]
mod tests {
    use super::*;

    #[test]
    fn test_micros_saturates() {
        assert_eq!(micros(Duration::from_millis(3)), 3_000);
        assert_eq!(micros(Duration::MAX), u64::MAX);
    }
}
