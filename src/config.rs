//! Queue configuration

#![forbid(unsafe_code)]

use std::time::Duration;

use crate::error::QueueError;

/// Configuration shared by every queue built from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Samples kept for rolling processing-time averages
    pub process_time_window: usize,

    /// How long an idle worker waits before re-checking for shutdown
    pub idle_poll_interval: Duration,

    /// Upper bound on how long `shutdown` waits for the worker to exit
    pub shutdown_timeout: Duration,

    /// Worker thread name prefix; the endpoint key is appended
    pub thread_name_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            process_time_window: 100,
            idle_poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
            thread_name_prefix: "endpoint-queue".to_string(),
        }
    }
}

impl QueueConfig {
    /// Largest accepted window
    pub const MAX_PROCESS_TIME_WINDOW: usize = 1 << 20;

    /// Set the rolling-average window
    #[must_use]
    pub fn with_process_time_window(mut self, samples: usize) -> Self {
        self.process_time_window = samples;
        self
    }

    /// Set the idle re-check interval
    #[must_use]
    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    /// Set the shutdown wait bound
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the worker thread name prefix
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Check the configuration
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] when the window is zero or too
    /// large, or either interval is zero.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.process_time_window == 0 {
            return Err(QueueError::InvalidConfig(
                "process_time_window must be > 0".to_string(),
            ));
        }
        if self.process_time_window > Self::MAX_PROCESS_TIME_WINDOW {
            return Err(QueueError::InvalidConfig(format!(
                "process_time_window must be <= {}",
                Self::MAX_PROCESS_TIME_WINDOW
            )));
        }
        if self.idle_poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "idle_poll_interval must be > 0".to_string(),
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(QueueError::InvalidConfig(
                "shutdown_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
