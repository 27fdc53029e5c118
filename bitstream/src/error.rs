//! Error types for bitstream operations.

use std::fmt;

/// Result type for bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors that can occur during bit-level encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitError {
    /// Attempted to read past the end of the buffer.
    UnexpectedEof {
        /// Number of bits requested.
        requested: usize,
        /// Number of bits available.
        available: usize,
    },

    /// Invalid bit count for the operation.
    InvalidBitCount {
        /// The invalid bit count provided.
        bits: usize,
        /// Maximum allowed bits for this operation.
        max_bits: usize,
    },

    /// Value exceeds the range representable by the specified number of bits.
    ValueOutOfRange {
        /// The value that was out of range.
        value: u64,
        /// Number of bits available.
        bits: usize,
    },

    /// A varint ran past its maximum encoded length.
    InvalidVarint,

    /// A NUL-terminated string exceeded the caller's bound.
    StringTooLong {
        /// Maximum accepted length in bytes.
        max: usize,
    },

    /// Seek or rewind target lies outside the buffer.
    SeekOutOfRange {
        /// Requested bit position.
        position: usize,
        /// Length of the buffer in bits.
        len_bits: usize,
    },
}

impl fmt::Display for BitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof {
                requested,
                available,
            } => {
                write!(
                    f,
                    "attempted to read {requested} bits but only {available} bits available"
                )
            }
            Self::InvalidBitCount { bits, max_bits } => {
                write!(f, "invalid bit count {bits}, maximum allowed is {max_bits}")
            }
            Self::ValueOutOfRange { value, bits } => {
                write!(f, "value {value} cannot be represented in {bits} bits")
            }
            Self::InvalidVarint => write!(f, "varint exceeds its maximum encoded length"),
            Self::StringTooLong { max } => {
                write!(f, "string is not terminated within {max} bytes")
            }
            Self::SeekOutOfRange { position, len_bits } => {
                write!(
                    f,
                    "bit position {position} is outside a buffer of {len_bits} bits"
                )
            }
        }
    }
}

impl std::error::Error for BitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unexpected_eof() {
        let err = BitError::UnexpectedEof {
            requested: 8,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("8 bits"), "should mention requested bits");
        assert!(msg.contains("3 bits"), "should mention available bits");
        assert!(msg.contains("read"), "should mention read operation");
    }

    #[test]
    fn error_display_invalid_bit_count() {
        let err = BitError::InvalidBitCount {
            bits: 40,
            max_bits: 32,
        };
        let msg = err.to_string();
        assert!(msg.contains("40"), "should mention invalid count");
        assert!(msg.contains("32"), "should mention maximum");
    }

    #[test]
    fn error_display_value_out_of_range() {
        let err = BitError::ValueOutOfRange {
            value: 256,
            bits: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("256"), "should mention the value");
        assert!(msg.contains("8 bits"), "should mention bit count");
    }

    #[test]
    fn error_display_seek() {
        let err = BitError::SeekOutOfRange {
            position: 99,
            len_bits: 16,
        };
        let msg = err.to_string();
        assert!(msg.contains("99"));
        assert!(msg.contains("16"));
    }

    #[test]
    fn error_equality() {
        let err1 = BitError::UnexpectedEof {
            requested: 8,
            available: 3,
        };
        let err2 = BitError::UnexpectedEof {
            requested: 8,
            available: 3,
        };
        let err3 = BitError::UnexpectedEof {
            requested: 8,
            available: 4,
        };
        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<BitError>();
    }
}
