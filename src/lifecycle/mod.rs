//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     NotStarted → Running (CAS winner binds on the boss group)
//!
//! Shutdown:
//!     Running → Closed (CAS winner runs teardown)
//!     → unbind → boss group → drain connections + worker group → executor
//! ```
//!
//! # Design Decisions
//! - One atomic state, one winner per transition
//! - Closed is terminal; a server instance is single-use
//! - Each teardown step is isolated; a failing step does not skip the rest

pub mod shutdown;
pub mod state;

pub use shutdown::Shutdown;
pub use state::{Lifecycle, LifecycleState};
