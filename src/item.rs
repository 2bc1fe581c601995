//! Work items and the ordering policy of the ready queue
//!
//! A [`WorkItem`] pairs a type-erased [`Job`] with the key it is ranked by.
//! Ranking is tier first (absolute), then numeric priority, then submission
//! time, then admission sequence. A key that compares *greater* runs first.

#![forbid(unsafe_code)]

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tier::Tier;

/// How a finished work function ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Returned a value
    Completed,
    /// Returned an error or panicked
    Failed,
    /// Observed its cancellation token and bailed out
    Cancelled,
}

/// Why a queued item was resolved without running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Removed by `cancel_tier`
    Tier,
    /// Its own token fired while it was queued
    Token,
    /// Drained by shutdown
    Shutdown,
}

impl CancelReason {
    /// Static label for logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tier => "tier",
            Self::Token => "token",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Ranking key of a queued item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingKey {
    /// Coarse bucket, strictly dominant
    pub tier: Tier,
    /// Tie-break inside a tier, higher wins
    pub priority: i32,
    /// Admission time, earlier wins
    pub submitted_at: Instant,
    /// Admission counter, earlier wins
    pub sequence: u64,
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then(self.priority.cmp(&other.priority))
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Type-erased unit of work plus the sender of its result
pub(crate) trait Job: Send {
    /// Execute the work function; panics are caught and reported as failures
    fn run(&mut self, token: &CancellationToken) -> Outcome;

    /// Error produced by `run`, if any
    fn error(&self) -> Option<&TaskError>;

    /// Deliver the result to the waiting handle. A job that never ran
    /// resolves as cancelled.
    fn resolve(self: Box<Self>);
}

type ResultSender<T> = oneshot::Sender<Result<T, TaskError>>;

struct TypedJob<T, F> {
    work: Option<F>,
    result: Option<Result<T, TaskError>>,
    sender: ResultSender<T>,
}

impl<T, F> Job for TypedJob<T, F>
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> Result<T, TaskError> + Send + 'static,
{
    fn run(&mut self, token: &CancellationToken) -> Outcome {
        let Some(work) = self.work.take() else {
            return Outcome::Cancelled;
        };

        let result = match panic::catch_unwind(AssertUnwindSafe(|| work(token))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        };

        let outcome = match &result {
            Ok(_) => Outcome::Completed,
            Err(TaskError::Cancelled) => Outcome::Cancelled,
            Err(_) => Outcome::Failed,
        };
        self.result = Some(result);
        outcome
    }

    fn error(&self) -> Option<&TaskError> {
        self.result.as_ref().and_then(|r| r.as_ref().err())
    }

    fn resolve(self: Box<Self>) {
        let this = *self;
        let result = this.result.unwrap_or(Err(TaskError::Cancelled));
        // Caller may have dropped its handle
        let _ = this.sender.send(result);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Erase `work` into a job and hand back the receiving half of its result
pub(crate) fn job<T, F>(work: F) -> (Box<dyn Job>, oneshot::Receiver<Result<T, TaskError>>)
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> Result<T, TaskError> + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let job = TypedJob {
        work: Some(work),
        result: None,
        sender,
    };
    (Box::new(job), receiver)
}

/// One admitted, not yet finished unit of work
pub(crate) struct WorkItem {
    key: OrderingKey,
    token: CancellationToken,
    job: Box<dyn Job>,
}

impl WorkItem {
    pub(crate) fn new(key: OrderingKey, token: CancellationToken, job: Box<dyn Job>) -> Self {
        Self { key, token, job }
    }

    pub(crate) fn key(&self) -> &OrderingKey {
        &self.key
    }

    pub(crate) fn tier(&self) -> Tier {
        self.key.tier
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn into_parts(self) -> (OrderingKey, CancellationToken, Box<dyn Job>) {
        (self.key, self.token, self.job)
    }

    /// Resolve as cancelled without running
    pub(crate) fn cancel(self) {
        self.job.resolve();
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("key", &self.key)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(tier: Tier, priority: i32, offset_ms: u64, sequence: u64) -> OrderingKey {
        OrderingKey {
            tier,
            priority,
            submitted_at: base() + Duration::from_millis(offset_ms),
            sequence,
        }
    }

    fn base() -> Instant {
        use std::sync::OnceLock;
        static BASE: OnceLock<Instant> = OnceLock::new();
        *BASE.get_or_init(Instant::now)
    }

    #[test]
    fn test_tier_dominates_priority() {
        let emergency_low = key(Tier::Emergency, i32::MIN, 0, 0);
        let critical_high = key(Tier::Critical, i32::MAX, 0, 1);
        assert!(emergency_low > critical_high);

        let normal = key(Tier::Normal, -5, 0, 2);
        let low = key(Tier::Low, 1_000_000, 0, 3);
        assert!(normal > low);
    }

    #[test]
    fn test_priority_within_tier() {
        assert!(key(Tier::High, 10, 5, 1) > key(Tier::High, 5, 0, 0));
    }

    #[test]
    fn test_earlier_submission_wins() {
        assert!(key(Tier::High, 5, 0, 1) > key(Tier::High, 5, 10, 0));
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let first = key(Tier::Normal, 1, 0, 7);
        let second = key(Tier::Normal, 1, 0, 8);
        assert!(first > second);
        assert_eq!(first.cmp(&first), Ordering::Equal);
    }

    #[test]
    fn test_job_runs_and_resolves() {
        let (mut job, mut rx) = job(|_token: &CancellationToken| Ok::<_, TaskError>(42));
        let outcome = job.run(&CancellationToken::new());
        assert_eq!(outcome, Outcome::Completed);
        assert!(job.error().is_none());

        job.resolve();
        assert_eq!(rx.try_recv().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_job_classifies_errors() {
        let (mut failing, _rx) = job(|_: &CancellationToken| -> Result<(), TaskError> {
            Err(TaskError::failed("nope"))
        });
        assert_eq!(failing.run(&CancellationToken::new()), Outcome::Failed);
        assert!(failing.error().unwrap().is_failure());

        let (mut cancelled, _rx) =
            job(|_: &CancellationToken| -> Result<(), TaskError> { Err(TaskError::Cancelled) });
        assert_eq!(cancelled.run(&CancellationToken::new()), Outcome::Cancelled);
    }

    #[test]
    fn test_job_catches_panics() {
        let (mut job, mut rx) = job(|_: &CancellationToken| -> Result<u8, TaskError> {
            panic!("work exploded")
        });
        assert_eq!(job.run(&CancellationToken::new()), Outcome::Failed);
        job.resolve();

        match rx.try_recv().unwrap() {
            Err(TaskError::Panicked(msg)) => assert_eq!(msg, "work exploded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unrun_job_resolves_cancelled() {
        let (job, mut rx) = job(|_: &CancellationToken| Ok::<_, TaskError>(1));
        job.resolve();
        assert!(rx.try_recv().unwrap().unwrap_err().is_cancelled());
    }
}
