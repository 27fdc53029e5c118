//! Configurable limits for bounded framing.

/// Wire-level limits for envelope extraction.
///
/// These limits are enforced while framing so a corrupt length prefix cannot
/// make the extractor buffer unbounded input. Entity and string-table bounds
/// belong to higher layers (codec).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Limits {
    /// Maximum declared size of a single frame payload in bytes.
    pub max_frame_bytes: usize,

    /// Maximum number of unconsumed bytes carried between chunks.
    pub max_pending_bytes: usize,

    /// Maximum size of one inner message inside a packet.
    pub max_message_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // Full packets on large maps run to a few megabytes.
            max_frame_bytes: 32 * 1024 * 1024,
            max_pending_bytes: 64 * 1024 * 1024,
            max_message_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_frame_bytes: 4096,
            max_pending_bytes: 16 * 1024,
            max_message_bytes: 2048,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_frame_bytes: usize::MAX,
            max_pending_bytes: usize::MAX,
            max_message_bytes: usize::MAX,
        }
    }
}
