//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! handler stage (handler.rs, event loop thread)
//!     → executor.rs (InvocationExecutor, cores * 2 + 1 threads)
//!     → registry.rs (method_identifier → ServerMethodInvoker)
//!     → reply written back through ChannelContext
//! ```
//!
//! # Design Decisions
//! - Invokers never run on event loop threads
//! - Registry is a concurrent map; registration may race with traffic
//! - Executor shutdown abandons queued work instead of draining it

pub mod executor;
pub mod handler;
pub mod registry;

pub use executor::{ExecutorError, InvocationExecutor};
pub use handler::ServerHandler;
pub use registry::{FnMethodInvoker, InvokeError, MethodInvokerRegistry, ServerMethodInvoker};
