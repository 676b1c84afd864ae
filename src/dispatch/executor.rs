//! `InvocationExecutor` — fixed pool of threads for method invocations.
//!
//! Spawns N OS threads at creation. Workers take tasks from a shared
//! unbounded queue. Invocations never run on event loop threads, so a slow
//! invoker only ties up one of these threads.
//!
//! `shutdown_now` rejects new work and abandons whatever is still queued.
//! Tasks already running are left to finish on their own. Every submitted
//! task is either run or counted as abandoned, never both.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use thiserror::Error;
use tokio::sync::mpsc;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Submission failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("{executor} rejected task: executor has been shut down")]
    Rejected { executor: String },
}

/// Shared state between submitters and workers.
struct ExecutorInner {
    queue: Mutex<mpsc::UnboundedReceiver<Task>>,
    /// Number of workers currently running a task.
    active: AtomicUsize,
    shutdown: AtomicBool,
    /// Tasks a worker dequeued after shutdown began. Only touched under `queue`.
    discarded: AtomicUsize,
}

pub struct InvocationExecutor {
    name: String,
    threads: usize,
    inner: Arc<ExecutorInner>,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
}

impl InvocationExecutor {
    /// Create a pool of `threads` workers named `{name_prefix}-{index}`.
    pub fn new(name_prefix: &str, threads: usize) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ExecutorInner {
            queue: Mutex::new(rx),
            active: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            discarded: AtomicUsize::new(0),
        });

        for index in 0..threads {
            let inner = Arc::clone(&inner);
            // Handles are not kept: shutdown never waits for running invocations.
            thread::Builder::new()
                .name(format!("{}-{}", name_prefix, index))
                .spawn(move || worker_loop(inner))?;
        }

        Ok(Self {
            name: name_prefix.to_string(),
            threads,
            inner,
            sender: Mutex::new(Some(tx)),
        })
    }

    /// Default pool sizing: available cores * 2 + 1.
    pub fn default_threads() -> usize {
        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores * 2 + 1
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Workers currently running a task.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Queue `task` for execution on a pool thread.
    pub fn execute<F>(&self, task: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        match sender.as_ref() {
            Some(tx) if !self.is_shutdown() => tx.send(Box::new(task)).map_err(|_| self.rejected()),
            _ => Err(self.rejected()),
        }
    }

    /// Stop accepting work and drop everything still queued.
    ///
    /// Returns the number of abandoned tasks. Later calls return 0.
    pub fn shutdown_now(&self) -> usize {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
        if sender.is_none() {
            return 0;
        }
        drop(sender);

        // Idle workers wake with `None` once the sender is gone, releasing the queue.
        // Whatever a worker pulled in the meantime was counted under this lock.
        let mut queue = self.inner.queue.lock().unwrap_or_else(|p| p.into_inner());
        let mut abandoned = self.inner.discarded.swap(0, Ordering::SeqCst);
        while queue.try_recv().is_ok() {
            abandoned += 1;
        }
        abandoned
    }

    fn rejected(&self) -> ExecutorError {
        ExecutorError::Rejected {
            executor: self.name.clone(),
        }
    }
}

impl Drop for InvocationExecutor {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

impl std::fmt::Debug for InvocationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationExecutor")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("active", &self.active_count())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<ExecutorInner>) {
    loop {
        let task = {
            let mut queue = inner.queue.lock().unwrap_or_else(|p| p.into_inner());
            match queue.blocking_recv() {
                Some(_abandoned) if inner.shutdown.load(Ordering::SeqCst) => {
                    inner.discarded.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                Some(task) => task,
                None => break,
            }
        };

        inner.active.fetch_add(1, Ordering::Relaxed);
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!(
                thread = thread::current().name().unwrap_or("unnamed"),
                "Method invoker task panicked"
            );
        }
        inner.active.fetch_sub(1, Ordering::Relaxed);
    }
}
