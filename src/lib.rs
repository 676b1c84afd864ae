//! Transport server for an internal RPC system.
//!
//! ```text
//!                 ┌──────────────────────── RemotingServer ─────────────────────────┐
//!                 │                                                                  │
//!   connect ──────┼─▶ boss group (1 thread)                                          │
//!                 │      accept + child socket options                               │
//!                 │            │                                                     │
//!                 │            ▼                                                     │
//!                 │   worker group (N threads)                                       │
//!                 │      encoder → decoder → server-idle-handle → handler ──┐        │
//!                 │                                                         │        │
//!                 │                                                         ▼        │
//!   reply ◀───────┼──── ChannelContext::write ◀── invocation executor (2*cores+1)    │
//!                 │                                   method invoker registry        │
//!                 └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod transport;

pub use config::ServerConfig;
pub use dispatch::{FnMethodInvoker, InvokeError, ServerMethodInvoker};
pub use error::{RemotingError, RemotingResult};
pub use lifecycle::LifecycleState;
pub use protocol::Transporter;
pub use server::RemotingServer;
