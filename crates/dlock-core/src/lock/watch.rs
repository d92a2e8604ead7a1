//! Watch bindings
//!
//! The coordination service runs watch callbacks on its own thread, possibly
//! long after the lock that registered them is gone. A binding only holds a
//! `Weak` reference to the lock's signal: firing either wakes a lock that is
//! provably alive or does nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dlock_foundation::{WatchedEvent, Watcher};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::metrics;

/// Wake-up side of a `DistributedLock`. Owned solely by the lock.
#[derive(Debug, Default)]
pub struct LockSignal {
    notify: Notify,
    wakeups: AtomicU64,
}

impl LockSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wake the lock's wait loop. A wake with no waiter is kept as a permit
    /// and consumed by the next wait.
    pub fn notify(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Park until the next notification
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Notifications received so far
    pub fn wakeups(&self) -> u64 {
        self.wakeups.load(Ordering::Relaxed)
    }
}

/// A pending watch registered on behalf of one lock
#[derive(Debug, Clone)]
pub struct WatchBinding {
    target: Weak<LockSignal>,
    lock_path: String,
}

impl WatchBinding {
    pub fn new(signal: &Arc<LockSignal>, lock_path: impl Into<String>) -> Self {
        Self {
            target: Arc::downgrade(signal),
            lock_path: lock_path.into(),
        }
    }

    /// Deliver an event: wake the lock if it still exists, otherwise drop it.
    /// Returns whether a live lock was woken.
    pub fn fire(&self, event: &WatchedEvent) -> bool {
        match self.target.upgrade() {
            Some(signal) => {
                trace!(lock_path = %self.lock_path, event = ?event.kind, "Watch fired, waking lock");
                signal.notify();
                metrics::record_watch(true);
                true
            }
            None => {
                debug!(lock_path = %self.lock_path, event = ?event.kind, "Watch fired for a dropped lock, ignoring");
                metrics::record_watch(false);
                false
            }
        }
    }

    pub fn into_watcher(self) -> Watcher {
        Box::new(move |event| {
            self.fire(&event);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_wakes_live_lock() {
        let signal = LockSignal::new();
        let binding = WatchBinding::new(&signal, "/locks");

        assert!(binding.fire(&WatchedEvent::children_changed("/locks")));
        assert_eq!(signal.wakeups(), 1);

        // The permit left by the fire completes the next wait immediately
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_fire_after_lock_dropped_is_noop() {
        let signal = LockSignal::new();
        let watcher = WatchBinding::new(&signal, "/locks").into_watcher();
        let binding = WatchBinding::new(&signal, "/locks");
        drop(signal);

        watcher(WatchedEvent::children_changed("/locks"));
        assert!(!binding.fire(&WatchedEvent::node_deleted("/locks")));
    }

    #[test]
    fn test_fire_from_foreign_thread_after_drop() {
        let signal = LockSignal::new();
        let watcher = WatchBinding::new(&signal, "/locks").into_watcher();
        drop(signal);

        std::thread::spawn(move || watcher(WatchedEvent::children_changed("/locks")))
            .join()
            .unwrap();
    }

    #[test]
    fn test_binding_does_not_keep_lock_alive() {
        let signal = LockSignal::new();
        let binding = WatchBinding::new(&signal, "/locks");
        assert_eq!(Arc::strong_count(&signal), 1);
        assert_eq!(Arc::weak_count(&signal), 1);
        drop(binding);
        assert_eq!(Arc::weak_count(&signal), 0);
    }
}
