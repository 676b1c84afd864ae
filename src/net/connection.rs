//! Live connection accounting.
//!
//! Every accepted socket holds a [`ConnectionGuard`] for as long as its
//! pipeline runs. `close()` uses the tracker to wait, bounded by the grace
//! window, until every pipeline has finished flushing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id of one accepted connection, shown as `conn-{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct LiveSet {
    open: Mutex<u64>,
    drained: Condvar,
}

impl LiveSet {
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counts the connections of one server. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<LiveSet>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted connection under a fresh id.
    pub fn track(&self) -> ConnectionGuard {
        *self.live.lock() += 1;
        ConnectionGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.live.lock()
    }

    /// Block until no connection is left or `timeout` elapses.
    ///
    /// Returns `true` if every connection finished in time.
    pub fn wait_for_drain(&self, timeout: Duration) -> bool {
        let open = self.live.lock();
        let (open, _) = self
            .live
            .drained
            .wait_timeout_while(open, timeout, |open| *open > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *open == 0
    }
}

/// Held by a connection's pipeline task; releases its slot on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    live: Arc<LiveSet>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut open = self.live.lock();
        *open = open.saturating_sub(1);
        if *open == 0 {
            self.live.drained.notify_all();
        }
        drop(open);
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_and_labelled() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert_eq!(a.to_string(), format!("conn-{}", a.as_u64()));
    }

    #[test]
    fn guards_hold_slots_until_dropped() {
        let tracker = ConnectionTracker::new();
        let shared = tracker.clone();

        let first = tracker.track();
        let second = shared.track();
        assert_ne!(first.id(), second.id());
        assert_eq!(tracker.active_count(), 2);

        drop(second);
        assert_eq!(shared.active_count(), 1);
        drop(first);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn drain_waits_for_the_last_guard() {
        let tracker = ConnectionTracker::new();
        assert!(tracker.wait_for_drain(Duration::ZERO));

        let guard = tracker.track();
        assert!(!tracker.wait_for_drain(Duration::from_millis(20)));

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            drop(guard);
        });
        assert!(tracker.wait_for_drain(Duration::from_secs(5)));
        releaser.join().unwrap();
    }
}
