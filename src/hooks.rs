//! Lifecycle hooks for observing a queue

#![forbid(unsafe_code)]
#![allow(clippy::inline_always)] /* Called on every task transition */

use crate::item::{CancelReason, Outcome};
use crate::tier::Tier;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::warn;

/// Queue observer interface.
///
/// Hooks run on the thread that caused the transition (the submitter, the
/// canceller, or the worker) and never while the queue's state lock is held.
pub trait QueueHooks: Send + Sync {
    /// Called after an item is admitted.
    fn on_submit(&self, endpoint: &str, tier: Tier, priority: i32);

    /// Called on the worker just before a work function runs.
    fn before_run(&self, endpoint: &str, tier: Tier);

    /// Called on the worker after a work function returns.
    fn after_run(&self, endpoint: &str, tier: Tier, outcome: Outcome, elapsed: Duration);

    /// Called for each queued item resolved without running.
    fn on_cancel(&self, endpoint: &str, tier: Tier, reason: CancelReason);
}

/// Null implementation of `QueueHooks`
#[derive(Debug, Default)]
pub struct NullHooks;

impl QueueHooks for NullHooks {
    #[inline(always)]
    fn on_submit(&self, _endpoint: &str, _tier: Tier, _priority: i32) {
        // No-op
    }

    #[inline(always)]
    fn before_run(&self, _endpoint: &str, _tier: Tier) {
        // No-op
    }

    #[inline(always)]
    fn after_run(&self, _endpoint: &str, _tier: Tier, _outcome: Outcome, _elapsed: Duration) {
        // No-op
    }

    #[inline(always)]
    fn on_cancel(&self, _endpoint: &str, _tier: Tier, _reason: CancelReason) {
        // No-op
    }
}

/// Swappable slot holding the hooks of one queue.
///
/// Dispatch clones the installed hooks out of the lock before calling them,
/// and a panicking hook is caught and logged so it never reaches the caller.
pub struct HookRegistry {
    hooks: RwLock<Option<Arc<dyn QueueHooks>>>,
}

impl HookRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(None),
        }
    }

    /// Create a registry with `hooks` installed
    #[must_use]
    pub fn with_hooks(hooks: Arc<dyn QueueHooks>) -> Self {
        Self {
            hooks: RwLock::new(Some(hooks)),
        }
    }

    /// Install hooks, returning the previous ones
    pub fn set_hooks(&self, hooks: Arc<dyn QueueHooks>) -> Option<Arc<dyn QueueHooks>> {
        self.hooks.write().replace(hooks)
    }

    /// Remove the installed hooks
    pub fn clear_hooks(&self) -> Option<Arc<dyn QueueHooks>> {
        self.hooks.write().take()
    }

    /// True when hooks are installed
    #[inline]
    pub fn has_hooks(&self) -> bool {
        self.hooks.read().is_some()
    }

    /* Clone out so a hook may itself swap hooks */
    #[inline(always)]
    fn current(&self) -> Option<Arc<dyn QueueHooks>> {
        self.hooks.read().clone()
    }

    /* Run one callback, containing any panic */
    #[inline(always)]
    fn dispatch(&self, callback: &'static str, f: impl FnOnce(&dyn QueueHooks)) {
        let Some(hooks) = self.current() else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| f(hooks.as_ref()))).is_err() {
            #[cfg(feature = "tracing")]
            warn!(callback, "Queue hook panicked");

            #[cfg(not(feature = "tracing"))]
            let _ = callback;
        }
    }

    /// Forward [`QueueHooks::on_submit`]
    #[inline(always)]
    pub fn on_submit(&self, endpoint: &str, tier: Tier, priority: i32) {
        self.dispatch("on_submit", |hooks| hooks.on_submit(endpoint, tier, priority));
    }

    /// Forward [`QueueHooks::before_run`]
    #[inline(always)]
    pub fn before_run(&self, endpoint: &str, tier: Tier) {
        self.dispatch("before_run", |hooks| hooks.before_run(endpoint, tier));
    }

    /// Forward [`QueueHooks::after_run`]
    #[inline(always)]
    pub fn after_run(&self, endpoint: &str, tier: Tier, outcome: Outcome, elapsed: Duration) {
        self.dispatch("after_run", |hooks| {
            hooks.after_run(endpoint, tier, outcome, elapsed);
        });
    }

    /// Forward [`QueueHooks::on_cancel`]
    #[inline(always)]
    pub fn on_cancel(&self, endpoint: &str, tier: Tier, reason: CancelReason) {
        self.dispatch("on_cancel", |hooks| hooks.on_cancel(endpoint, tier, reason));
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("installed", &self.has_hooks())
            .finish()
    }
}
