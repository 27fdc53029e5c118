//! Schema and field-path errors.

use std::fmt;

use bitstream::BitError;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while decoding field paths, building serializers or
/// decoding field values.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaError {
    /// Bit-level read failure.
    Bits(BitError),

    /// A field-path operation pushed past the maximum depth.
    FieldPathTooDeep { depth: usize },

    /// A field-path operation popped or indexed above the root.
    FieldPathUnderflow { op: &'static str },

    /// A completed field path holds a negative or oversized element.
    InvalidFieldPathElement { position: usize, value: i32 },

    /// A transfer code names no interned path.
    InvalidTransferCode { code: u32 },

    /// A field path walks off the end of a serializer.
    UnresolvedFieldPath { serializer: String, path: String },

    /// A serializer referenced by name and version was never defined.
    UnknownSerializer { name: String, version: i32 },

    /// A symbol index lies outside the symbol table.
    UnknownSymbol { index: i32 },

    /// A class id was never announced.
    UnknownClass { id: i32 },

    /// Quantized float parameters are contradictory.
    InvalidQuantizedFloat { reason: &'static str },

    /// A var type string could not be parsed.
    InvalidVarType { text: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(err) => write!(f, "bit read error: {err}"),
            Self::FieldPathTooDeep { depth } => {
                write!(f, "field path deeper than {depth} elements")
            }
            Self::FieldPathUnderflow { op } => {
                write!(f, "field path operation {op} moved above the root")
            }
            Self::InvalidFieldPathElement { position, value } => {
                write!(f, "field path element {position} has invalid value {value}")
            }
            Self::InvalidTransferCode { code } => {
                write!(f, "unknown field path transfer code 0x{code:08X}")
            }
            Self::UnresolvedFieldPath { serializer, path } => {
                write!(f, "field path {path} does not resolve in serializer {serializer}")
            }
            Self::UnknownSerializer { name, version } => {
                write!(f, "unknown serializer {name} version {version}")
            }
            Self::UnknownSymbol { index } => write!(f, "unknown symbol index {index}"),
            Self::UnknownClass { id } => write!(f, "unknown class id {id}"),
            Self::InvalidQuantizedFloat { reason } => {
                write!(f, "invalid quantized float: {reason}")
            }
            Self::InvalidVarType { text } => write!(f, "invalid var type: {text:?}"),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bits(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BitError> for SchemaError {
    fn from(err: BitError) -> Self {
        Self::Bits(err)
    }
}
