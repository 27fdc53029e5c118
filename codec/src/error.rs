//! Error types for entity and string-table decoding.

use std::fmt;

use bitstream::BitError;
use schema::SchemaError;
use wire::WireError;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding entity deltas or string tables, or while
/// applying them to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// Bitstream error.
    Bitstream(BitError),

    /// Framing, decompression or protobuf error.
    Wire(WireError),

    /// Field path, serializer or field decoder error.
    Schema(SchemaError),

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// An update named an entity slot that holds nothing.
    EntityNotFound { index: u32 },

    /// A string table id or name was never created.
    UnknownStringTable { table: String },

    /// Baselines must be recorded in partition order.
    BaselineOutOfOrder { last: u32, new: u32 },
}

/// Specific limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Entities,
    FieldPathDepth,
    StringTableEntries,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitstream(e) => write!(f, "bitstream error: {e}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Schema(e) => write!(f, "schema error: {e}"),
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::EntityNotFound { index } => write!(f, "entity {index} not found"),
            Self::UnknownStringTable { table } => write!(f, "unknown string table {table}"),
            Self::BaselineOutOfOrder { last, new } => {
                write!(f, "baseline for partition {new} recorded after partition {last}")
            }
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Entities => "entities",
            Self::FieldPathDepth => "field path depth",
            Self::StringTableEntries => "string table entries",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bitstream(e) => Some(e),
            Self::Wire(e) => Some(e),
            Self::Schema(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BitError> for CodecError {
    fn from(err: BitError) -> Self {
        Self::Bitstream(err)
    }
}

impl From<WireError> for CodecError {
    fn from(err: WireError) -> Self {
        Self::Wire(err)
    }
}

impl From<SchemaError> for CodecError {
    fn from(err: SchemaError) -> Self {
        Self::Schema(err)
    }
}
