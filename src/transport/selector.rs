//! I/O backend selection.
//!
//! The backend is chosen once, when the server is constructed, and the same
//! value is used to build both event loop groups and to bind the listener.
//! Nothing else in the crate looks at the platform.

use std::io;
use tokio::runtime;

/// Readiness events processed per reactor tick on the `Epoll` profile.
const EPOLL_EVENTS_PER_TICK: usize = 1024;

/// Readiness events processed per reactor tick on the `Portable` profile.
const PORTABLE_EVENTS_PER_TICK: usize = 256;

/// Reactor profile of a server instance.
///
/// Both variants run on tokio's reactor, which is epoll on Linux either way.
/// The variant only tunes how the reactor is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoBackend {
    /// Linux/Android host: larger batches of readiness events per tick.
    Epoll,
    /// Any host: tokio's default-sized batches.
    Portable,
}

impl IoBackend {
    /// Pick the best backend for this host.
    ///
    /// `epoll_enabled` lets operators force the portable backend.
    pub fn select(epoll_enabled: bool) -> Self {
        if epoll_enabled && Self::epoll_available() {
            IoBackend::Epoll
        } else {
            IoBackend::Portable
        }
    }

    /// Whether the host is one the `Epoll` profile is meant for.
    pub fn epoll_available() -> bool {
        cfg!(any(target_os = "linux", target_os = "android"))
    }

    pub fn name(&self) -> &'static str {
        match self {
            IoBackend::Epoll => "epoll",
            IoBackend::Portable => "portable",
        }
    }

    /// Runtime builder for an event loop group of `threads` I/O threads.
    pub fn runtime_builder(&self, threads: usize) -> runtime::Builder {
        let mut builder = runtime::Builder::new_multi_thread();
        builder.worker_threads(threads.max(1)).enable_all();
        match self {
            IoBackend::Epoll => builder.max_io_events_per_tick(EPOLL_EVENTS_PER_TICK),
            IoBackend::Portable => builder.max_io_events_per_tick(PORTABLE_EVENTS_PER_TICK),
        };
        builder
    }

    /// Fails when the `Epoll` profile was selected on a host it is not meant for.
    pub fn ensure_available(&self) -> io::Result<()> {
        match self {
            IoBackend::Epoll if !Self::epoll_available() => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "epoll transport is not available on this platform",
            )),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for IoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
