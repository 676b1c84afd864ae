//! Event loop groups.
//!
//! A group is a dedicated multi-thread tokio runtime. A server owns two of
//! them: `boss` (one thread, accepts connections) and `worker` (services
//! established connections).

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::transport::selector::IoBackend;

/// Role of an event loop group, used in thread names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLoopRole {
    Boss,
    Worker,
}

impl EventLoopRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLoopRole::Boss => "boss",
            EventLoopRole::Worker => "worker",
        }
    }
}

/// A pool of I/O threads backed by its own runtime.
///
/// Threads are named `{server_name}-{role}-{index}`.
pub struct EventLoopGroup {
    name: String,
    threads: usize,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

impl EventLoopGroup {
    pub fn new(
        server_name: &str,
        role: EventLoopRole,
        threads: usize,
        backend: IoBackend,
    ) -> std::io::Result<Self> {
        let prefix = format!("{}-{}", server_name, role.as_str());
        let next_index = Arc::new(AtomicUsize::new(0));
        let thread_prefix = prefix.clone();

        let runtime = backend
            .runtime_builder(threads)
            .thread_name_fn(move || {
                let index = next_index.fetch_add(1, Ordering::Relaxed);
                format!("{}-{}", thread_prefix, index)
            })
            .build()?;

        tracing::debug!(group = %prefix, threads, backend = %backend, "Event loop group created");

        Ok(Self {
            name: prefix,
            threads: threads.max(1),
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Group name, `{server_name}-{role}`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Handle for spawning onto this group. Spawns after shutdown are dropped.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn is_shutdown(&self) -> bool {
        self.runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Shut the group down, giving in-flight work up to `timeout` to finish.
    ///
    /// Blocks the caller; must not be called from inside an async context.
    /// Returns `false` if the group was already shut down.
    pub fn shutdown_gracefully(&self, timeout: Duration) -> bool {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match runtime {
            Some(runtime) => {
                runtime.shutdown_timeout(timeout);
                tracing::debug!(group = %self.name, "Event loop group terminated");
                true
            }
            None => false,
        }
    }
}

impl Drop for EventLoopGroup {
    fn drop(&mut self) {
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for EventLoopGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopGroup")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_are_named_by_server_and_role() {
        let group =
            EventLoopGroup::new("unit", EventLoopRole::Worker, 2, IoBackend::Portable).unwrap();
        let name = group
            .handle()
            .block_on(async {
                tokio::spawn(async { std::thread::current().name().map(str::to_owned) })
                    .await
                    .unwrap()
            })
            .unwrap();

        assert!(name.starts_with("unit-worker-"), "unexpected thread name {name}");
        assert_eq!(group.name(), "unit-worker");
        assert_eq!(group.threads(), 2);
    }

    #[test]
    fn shutdown_is_one_shot() {
        let group = EventLoopGroup::new("unit", EventLoopRole::Boss, 1, IoBackend::Portable).unwrap();
        assert!(!group.is_shutdown());
        assert!(group.shutdown_gracefully(Duration::from_millis(100)));
        assert!(group.is_shutdown());
        assert!(!group.shutdown_gracefully(Duration::from_millis(100)));
    }
}
