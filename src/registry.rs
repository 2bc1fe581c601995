//! Keyed collection of queues, one per endpoint
//!
//! The registry only creates, looks up and retires queues. It applies no
//! policy across them: each queue schedules its own work independently.

#![forbid(unsafe_code)]

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::queue::{PriorityTaskQueue, ShutdownOutcome};
use crate::stats::StatsSnapshot;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

/// Lazily populated map from endpoint key to queue
#[derive(Debug)]
pub struct QueueRegistry {
    queues: DashMap<String, Arc<PriorityTaskQueue>>,
    config: QueueConfig,
}

impl QueueRegistry {
    /// Create a registry whose queues share `config`
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        Ok(Self {
            queues: DashMap::new(),
            config,
        })
    }

    /// Return the queue for `endpoint_key`, creating it on first use
    ///
    /// # Errors
    ///
    /// Propagates queue construction errors.
    pub fn get_or_create(&self, endpoint_key: &str) -> Result<Arc<PriorityTaskQueue>, QueueError> {
        if let Some(queue) = self.queues.get(endpoint_key) {
            return Ok(Arc::clone(queue.value()));
        }

        match self.queues.entry(endpoint_key.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let queue = Arc::new(PriorityTaskQueue::new(endpoint_key, self.config.clone())?);
                entry.insert(Arc::clone(&queue));

                #[cfg(feature = "tracing")]
                debug!(endpoint = %endpoint_key, "Registered queue");

                Ok(queue)
            }
        }
    }

    /// Existing queue for `endpoint_key`
    #[must_use]
    pub fn get(&self, endpoint_key: &str) -> Option<Arc<PriorityTaskQueue>> {
        self.queues.get(endpoint_key).map(|q| Arc::clone(q.value()))
    }

    /// Unregister and shut down the queue for `endpoint_key`
    pub fn remove(&self, endpoint_key: &str) -> Option<ShutdownOutcome> {
        let (_, queue) = self.queues.remove(endpoint_key)?;
        Some(queue.shutdown())
    }

    /// Number of registered queues
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// True when no queue is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Registered endpoint keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Statistics of every registered queue, sorted by endpoint key
    #[must_use]
    pub fn stats_all(&self) -> Vec<StatsSnapshot> {
        let queues = self.snapshot_queues();
        let mut stats: Vec<StatsSnapshot> = queues.iter().map(|q| q.stats()).collect();
        stats.sort_by(|a, b| a.endpoint_key.cmp(&b.endpoint_key));
        stats
    }

    /// Shut down and unregister every queue
    ///
    /// Returns the number of queues whose worker did not exit in time.
    pub fn shutdown_all(&self) -> usize {
        let queues = self.snapshot_queues();
        self.queues.clear();

        #[cfg(feature = "tracing")]
        info!(count = queues.len(), "Shutting down all queues");

        queues
            .iter()
            .filter(|q| q.shutdown() == ShutdownOutcome::TimedOut)
            .count()
    }

    /// Queue configuration used for new entries
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /* Clone out so no shard lock is held while calling into queues */
    fn snapshot_queues(&self) -> Vec<Arc<PriorityTaskQueue>> {
        self.queues.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self {
            queues: DashMap::new(),
            config: QueueConfig::default(),
        }
    }
}

impl Drop for QueueRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_get_or_create_reuses_queue() {
        let registry = QueueRegistry::default();
        assert!(registry.is_empty());

        let a = registry.get_or_create("orders").unwrap();
        let b = registry.get_or_create("orders").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.get_or_create("billing").unwrap();
        assert_eq!(registry.keys(), vec!["billing".to_string(), "orders".to_string()]);
    }

    #[test]
    fn test_queues_are_independent() {
        let registry = QueueRegistry::default();
        let orders = registry.get_or_create("orders").unwrap();
        let billing = registry.get_or_create("billing").unwrap();

        orders
            .submit(|_| Ok(()), 0, Tier::High, &CancellationToken::new())
            .unwrap()
            .wait()
            .unwrap();

        let stats = registry.stats_all();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].endpoint_key, "billing");
        assert_eq!(stats[0].total_processed, 0);
        assert_eq!(stats[1].endpoint_key, "orders");
        assert_eq!(stats[1].total_processed, 1);
        assert!(!billing.is_started());
    }

    #[test]
    fn test_remove_shuts_down() {
        let registry = QueueRegistry::default();
        let queue = registry.get_or_create("search").unwrap();

        assert_eq!(registry.remove("search"), Some(ShutdownOutcome::Completed));
        assert!(queue.is_shut_down());
        assert!(registry.get("search").is_none());
        assert_eq!(registry.remove("search"), None);
    }

    #[test]
    fn test_shutdown_all() {
        let registry = QueueRegistry::default();
        let a = registry.get_or_create("a").unwrap();
        let b = registry.get_or_create("b").unwrap();

        assert_eq!(registry.shutdown_all(), 0);
        assert!(registry.is_empty());
        assert!(a.is_shut_down());
        assert!(b.is_shut_down());
    }

    #[test]
    fn test_invalid_config() {
        let config = QueueConfig::default().with_process_time_window(0);
        assert!(QueueRegistry::new(config).is_err());
    }
}
