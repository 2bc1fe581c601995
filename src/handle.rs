//! Result handle returned by `submit`

#![forbid(unsafe_code)]

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::TaskError;
use crate::tier::Tier;

/// Resolves once the submitted work completes, fails, or is cancelled.
///
/// Await it from async code or call [`TaskHandle::wait`] from a plain thread.
/// Dropping the handle does not cancel the work.
#[derive(Debug)]
#[must_use = "a TaskHandle does nothing unless awaited or waited on"]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<Result<T, TaskError>>,
    tier: Tier,
    priority: i32,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        receiver: oneshot::Receiver<Result<T, TaskError>>,
        tier: Tier,
        priority: i32,
    ) -> Self {
        Self {
            receiver,
            tier,
            priority,
        }
    }

    /// Tier the work was submitted at
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Numeric priority the work was submitted with
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Block the current thread until the result is available
    ///
    /// # Errors
    ///
    /// Returns the task's failure or cancellation.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context;
    /// `.await` the handle there instead.
    pub fn wait(self) -> Result<T, TaskError> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(TaskError::Cancelled))
    }

    /// Take the result if it is already available
    ///
    /// Returns `None` while the task is still queued or running.
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Sender dropped unresolved: treat as cancelled
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Cancelled)))
    }
}
