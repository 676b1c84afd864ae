//! Wire protocol: message types and framing codec.

pub mod codec;
pub mod transporter;

pub use codec::{CodecError, TransporterDecoder, TransporterEncoder};
pub use transporter::{Transporter, TransporterHeader};
