//! Error types for wire format operations.

use std::fmt;

use bitstream::BitError;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while framing, decompressing or decoding envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireError {
    /// A varint in the outer envelope ran past five bytes.
    InvalidVarint {
        /// Byte offset of the varint within the pending buffer.
        offset: usize,
    },

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Snappy decompression failed.
    Decompress { reason: String },

    /// A protobuf envelope could not be decoded.
    Protobuf {
        message: &'static str,
        reason: String,
    },

    /// An inner message claims more bytes than its container holds.
    MessageTruncated {
        type_id: u32,
        size: usize,
        available: usize,
    },

    /// Bit-level read failure inside a container.
    Bits(BitError),
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    FrameBytes,
    PendingBytes,
    MessageBytes,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVarint { offset } => {
                write!(f, "invalid envelope varint at byte {offset}")
            }
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::Decompress { reason } => write!(f, "snappy decompression failed: {reason}"),
            Self::Protobuf { message, reason } => {
                write!(f, "failed to decode {message}: {reason}")
            }
            Self::MessageTruncated {
                type_id,
                size,
                available,
            } => {
                write!(
                    f,
                    "message {type_id} truncated: {size} bytes declared, {available} available"
                )
            }
            Self::Bits(err) => write!(f, "bit read error: {err}"),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FrameBytes => "frame bytes",
            Self::PendingBytes => "pending bytes",
            Self::MessageBytes => "message bytes",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bits(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BitError> for WireError {
    fn from(err: BitError) -> Self {
        Self::Bits(err)
    }
}

impl WireError {
    pub(crate) fn protobuf(message: &'static str, err: &prost::DecodeError) -> Self {
        Self::Protobuf {
            message,
            reason: err.to_string(),
        }
    }
}
