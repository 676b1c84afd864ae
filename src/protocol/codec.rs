//! Transporter framing.
//!
//! ```text
//! +--------+---------+------------+-------------+----------+------+
//! | magic  | version | header_len | header JSON | body_len | body |
//! | u16 BE | u8      | u32 BE     |             | u32 BE   |      |
//! +--------+---------+------------+-------------+----------+------+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::transporter::{Transporter, TransporterHeader};

pub const MAGIC: u16 = 0xBABE;
pub const VERSION: u8 = 0;

/// magic + version + header_len
const PREFIX_LEN: usize = 2 + 1 + 4;
const BODY_LEN_LEN: usize = 4;

pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Errors produced while framing transporters.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid magic 0x{0:04x}")]
    BadMagic(u16),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("frame of {length} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { length: usize, max: usize },

    #[error("malformed header: {0}")]
    Header(#[from] serde_json::Error),
}

/// Outbound stage: transporter to bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransporterEncoder;

impl Encoder<Transporter> for TransporterEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: Transporter, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = serde_json::to_vec(&item.header)?;
        let header_len = checked_len(header.len())?;
        let body_len = checked_len(item.body.len())?;

        dst.reserve(PREFIX_LEN + header.len() + BODY_LEN_LEN + item.body.len());
        dst.put_u16(MAGIC);
        dst.put_u8(VERSION);
        dst.put_u32(header_len);
        dst.put_slice(&header);
        dst.put_u32(body_len);
        dst.put_slice(&item.body);
        Ok(())
    }
}

fn checked_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::FrameTooLarge {
        length: len,
        max: u32::MAX as usize,
    })
}

/// Inbound stage: bytes to transporter, buffering partial frames.
#[derive(Debug, Clone, Copy)]
pub struct TransporterDecoder {
    max_frame_length: usize,
}

impl TransporterDecoder {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }
}

impl Default for TransporterDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for TransporterDecoder {
    type Item = Transporter;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Reject garbage as soon as the first bytes arrive.
        if src.len() >= 2 {
            let magic = u16::from_be_bytes([src[0], src[1]]);
            if magic != MAGIC {
                return Err(CodecError::BadMagic(magic));
            }
        }
        if src.len() >= 3 && src[2] != VERSION {
            return Err(CodecError::UnsupportedVersion(src[2]));
        }
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let header_len = read_u32(src, 3) as usize;
        if header_len > self.max_frame_length {
            return Err(CodecError::FrameTooLarge {
                length: header_len,
                max: self.max_frame_length,
            });
        }

        let body_len_at = PREFIX_LEN + header_len;
        if src.len() < body_len_at + BODY_LEN_LEN {
            src.reserve(body_len_at + BODY_LEN_LEN - src.len());
            return Ok(None);
        }

        let body_len = read_u32(src, body_len_at) as usize;
        if header_len + body_len > self.max_frame_length {
            return Err(CodecError::FrameTooLarge {
                length: header_len + body_len,
                max: self.max_frame_length,
            });
        }

        let frame_len = body_len_at + BODY_LEN_LEN + body_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        let header_bytes = src.split_to(header_len);
        src.advance(BODY_LEN_LEN);
        let body = src.split_to(body_len).freeze();

        let header: TransporterHeader = serde_json::from_slice(&header_bytes)?;
        Ok(Some(Transporter { header, body }))
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
