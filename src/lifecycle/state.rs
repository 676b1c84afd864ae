//! Server lifecycle state machine.
//!
//! # States
//! - NotStarted: constructed, nothing bound
//! - Running: start() won the transition (the bind may still have failed)
//! - Closed: close() won the transition; terminal
//!
//! # State Transitions
//! ```text
//! NotStarted → Running: start()
//! Running → Closed: close()
//! ```
//!
//! Only the caller that wins a transition performs its side effects.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a server instance.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted = 0,
    Running = 1,
    Closed = 2,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            1 => LifecycleState::Running,
            2 => LifecycleState::Closed,
            _ => LifecycleState::NotStarted,
        }
    }
}

/// Atomic guard over a [`LifecycleState`].
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::NotStarted as u8),
        }
    }

    pub fn current(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    /// Move `from → to`. Returns `true` only for the caller that made the move.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn try_start(&self) -> bool {
        self.transition(LifecycleState::NotStarted, LifecycleState::Running)
    }

    pub fn try_close(&self) -> bool {
        self.transition(LifecycleState::Running, LifecycleState::Closed)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn start_then_close_once() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.current(), LifecycleState::NotStarted);

        assert!(lifecycle.try_start());
        assert!(!lifecycle.try_start());
        assert_eq!(lifecycle.current(), LifecycleState::Running);

        assert!(lifecycle.try_close());
        assert!(!lifecycle.try_close());
        assert_eq!(lifecycle.current(), LifecycleState::Closed);
    }

    #[test]
    fn close_before_start_is_noop() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.try_close());
        assert_eq!(lifecycle.current(), LifecycleState::NotStarted);
    }

    #[test]
    fn closed_is_terminal() {
        let lifecycle = Lifecycle::new();
        lifecycle.try_start();
        lifecycle.try_close();
        assert!(!lifecycle.try_start());
        assert_eq!(lifecycle.current(), LifecycleState::Closed);
    }

    #[test]
    fn concurrent_starts_have_one_winner() {
        let lifecycle = Arc::new(Lifecycle::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if lifecycle.try_start() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
