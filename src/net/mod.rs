//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (boss group)
//!     → listener.rs (accept loop, child socket options)
//!     → connection.rs (id, drain tracking)
//!     → worker group: pipeline::PipelineAssembler
//! ```
//!
//! # Design Decisions
//! - Listener is bound on the boss group, connections run on the worker group
//! - Each connection tracked so close() can wait for it to drain

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{Acceptor, BindOptions, ChildOptions, ListeningChannel};
