//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig.epoll_enabled + platform
//!     → selector.rs (IoBackend, decided once)
//!     → event_loop.rs (boss group: 1 thread, worker group: N threads)
//!     → net::listener binds on the boss group
//! ```

pub mod event_loop;
pub mod selector;

pub use event_loop::{EventLoopGroup, EventLoopRole};
pub use selector::IoBackend;
