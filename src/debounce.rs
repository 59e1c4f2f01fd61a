//! Debounced recomputation timers
//!
//! User-driven setters delay their async recomputation until input has
//! stopped changing for [`DEBOUNCE_DELAY`]. [`DebounceMap`] enforces the
//! invariant that at most one pending timer exists per field: scheduling
//! under a key aborts whatever was pending under that key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Window applied to debounced field updates
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(1500);

/// At most one pending timer per field key, cancel-then-reschedule
#[derive(Debug, Default)]
pub struct DebounceMap {
    timers: Mutex<HashMap<&'static str, JoinHandle<()>>>,
}

impl DebounceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, aborting any timer already pending for
    /// `field`. Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, field: &'static str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        let mut timers = self.timers.lock().expect("debounce lock poisoned");
        if let Some(previous) = timers.insert(field, handle) {
            previous.abort();
        }
    }

    /// Abort the pending timer for `field`, if any
    pub fn cancel(&self, field: &'static str) {
        if let Some(handle) = self
            .timers
            .lock()
            .expect("debounce lock poisoned")
            .remove(field)
        {
            handle.abort();
        }
    }

    /// Abort every pending timer
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().expect("debounce lock poisoned");
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for DebounceMap {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_cancels_prior_timer() {
        let map = DebounceMap::new();
        let fired = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&fired);
            map.schedule("amount", Duration::from_millis(1500), async move {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_keys_do_not_interfere() {
        let map = DebounceMap::new();
        let fired = Arc::new(AtomicU32::new(0));

        for field in ["amount", "address"] {
            let counter = Arc::clone(&fired);
            map.schedule(field, Duration::from_millis(100), async move {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let map = DebounceMap::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        map.schedule("amount", Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        map.cancel("amount");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 0);
    }
}
