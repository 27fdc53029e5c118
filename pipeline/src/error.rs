//! Pipeline errors and their classification.

use std::fmt;
use std::io;

use codec::CodecError;
use schema::SchemaError;
use wire::{LimitKind as WireLimitKind, WireError};

use crate::config::ConfigError;

/// Result type for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;

/// How an error affects the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Truncated or corrupt envelope framing; ends the stream.
    Framing,
    /// Producer and decoder disagree about the schema; ends the stream.
    Schema,
    /// One packet or message could not be decoded; skipped and counted.
    Decode,
    /// A programming error inside the pipeline; ends the stream.
    Invariant,
}

impl ErrorKind {
    /// Returns `true` if the stream cannot continue after this error.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Decode)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Framing => "framing",
            Self::Schema => "schema",
            Self::Decode => "decode",
            Self::Invariant => "invariant",
        };
        write!(f, "{name}")
    }
}

/// Errors surfaced by the parser.
#[derive(Debug)]
#[non_exhaustive]
pub enum ParserError {
    /// Reading the input failed.
    Io(io::Error),

    /// Framing, decompression or protobuf error.
    Wire(WireError),

    /// Field path, serializer or field decoder error.
    Schema(SchemaError),

    /// Entity or string-table error.
    Codec(CodecError),

    /// The pipeline configuration was rejected.
    Config(ConfigError),

    /// A worker thread exited or dropped its channel while work was pending.
    WorkerLost { worker: usize },

    /// Internal bookkeeping went wrong.
    Invariant { reason: String },
}

impl ParserError {
    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant {
            reason: reason.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Framing,
            Self::Wire(err) => wire_kind(err),
            Self::Schema(err) => schema_kind(err),
            Self::Codec(CodecError::Schema(err)) => schema_kind(err),
            Self::Codec(CodecError::BaselineOutOfOrder { .. }) => ErrorKind::Invariant,
            Self::Codec(_) => ErrorKind::Decode,
            Self::Config(_) | Self::WorkerLost { .. } | Self::Invariant { .. } => {
                ErrorKind::Invariant
            }
        }
    }
}

fn wire_kind(err: &WireError) -> ErrorKind {
    match err {
        WireError::InvalidVarint { .. }
        | WireError::LimitsExceeded {
            kind: WireLimitKind::FrameBytes | WireLimitKind::PendingBytes,
            ..
        } => ErrorKind::Framing,
        _ => ErrorKind::Decode,
    }
}

fn schema_kind(err: &SchemaError) -> ErrorKind {
    match err {
        SchemaError::UnresolvedFieldPath { .. }
        | SchemaError::UnknownSerializer { .. }
        | SchemaError::UnknownClass { .. }
        | SchemaError::InvalidTransferCode { .. }
        | SchemaError::InvalidQuantizedFloat { .. }
        | SchemaError::InvalidVarType { .. } => ErrorKind::Schema,
        _ => ErrorKind::Decode,
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "read failed: {e}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Schema(e) => write!(f, "schema error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Config(e) => write!(f, "invalid config: {e}"),
            Self::WorkerLost { worker } => write!(f, "worker {worker} exited with work pending"),
            Self::Invariant { reason } => write!(f, "pipeline invariant violated: {reason}"),
        }
    }
}

impl std::error::Error for ParserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Wire(e) => Some(e),
            Self::Schema(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::WorkerLost { .. } | Self::Invariant { .. } => None,
        }
    }
}

impl From<io::Error> for ParserError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<WireError> for ParserError {
    fn from(err: WireError) -> Self {
        Self::Wire(err)
    }
}

impl From<SchemaError> for ParserError {
    fn from(err: SchemaError) -> Self {
        Self::Schema(err)
    }
}

impl From<CodecError> for ParserError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl From<ConfigError> for ParserError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
