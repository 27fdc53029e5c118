//! Limits for entity and string-table decoding.

use schema::MAX_FIELD_PATH_DEPTH;

/// Codec-specific limits enforced while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodecLimits {
    /// Maximum number of live entity slots.
    pub max_entities: usize,
    /// Maximum field path depth accepted in entity data.
    pub max_field_path_depth: usize,
    /// Maximum number of entries per string table.
    pub max_string_table_entries: usize,
    /// Number of recent keys string-table entries may reuse as a prefix.
    pub key_history: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_entities: 1 << 14,
            max_field_path_depth: MAX_FIELD_PATH_DEPTH,
            max_string_table_entries: 1 << 16,
            key_history: 32,
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_entities: 64,
            max_field_path_depth: MAX_FIELD_PATH_DEPTH,
            max_string_table_entries: 256,
            key_history: 32,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_entities: usize::MAX,
            max_field_path_depth: MAX_FIELD_PATH_DEPTH,
            max_string_table_entries: usize::MAX,
            key_history: 32,
        }
    }
}
