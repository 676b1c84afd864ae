//! Connection pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → decoder (TransporterDecoder, buffers partial frames)
//!     → server-idle-handle (IdleStateMonitor, reader idle only)
//!     → handler (ChannelHandler::channel_read / user_event_triggered)
//!
//! ChannelContext::write
//!     → encoder (TransporterEncoder)
//!     → socket bytes
//! ```

pub mod assembler;
pub mod handler;
pub mod idle;

pub use assembler::{ChannelPipeline, PipelineAssembler, PIPELINE_STAGES};
pub use handler::{ChannelContext, ChannelHandler};
pub use idle::{IdleStateEvent, IdleStateMonitor, InboundEvent};
