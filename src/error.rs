//! Error types for task submission, execution and queue construction

#![forbid(unsafe_code)]

/// Boxed error produced by a work function
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a submitted task did not produce a value
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Cancelled before or during execution
    #[error("task was cancelled")]
    Cancelled,

    /// Work function returned an error
    #[error("task failed: {0}")]
    Failed(#[source] BoxError),

    /// Work function panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Queue no longer accepts work
    #[error("queue `{0}` is shut down")]
    ShutDown(String),

    /// Worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl TaskError {
    /// Wrap any error as a work failure
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }

    /// True for every cancellation path
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True when the work function itself failed or panicked
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }
}

/// Errors raised while building a queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
