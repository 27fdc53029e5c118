//! Replay file header.

/// Magic bytes opening every replay file.
pub const MAGIC: [u8; 8] = *b"PBDEMS2\0";

/// Header size in bytes (16 total).
pub const HEADER_SIZE: usize = 8 + 4 + 4;

/// The fixed 16-byte header at the start of a replay file.
///
/// Broadcast streams carry no header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoHeader {
    pub magic: [u8; 8],
    /// Byte offset of the file summary, written when recording ends.
    pub summary_offset: u32,
    /// Byte offset of the spawn group table.
    pub spawn_groups_offset: u32,
}

impl DemoHeader {
    /// Parses the header from the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// Returns `None` if `buf` is shorter than a header. The magic is not
    /// validated here; see [`has_valid_magic`](Self::has_valid_magic).
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let bytes: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[..8]);
        let summary_offset = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let spawn_groups_offset = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        Some(Self {
            magic,
            summary_offset,
            spawn_groups_offset,
        })
    }

    /// Returns `true` if the magic matches [`MAGIC`].
    #[must_use]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == MAGIC
    }

    /// Encodes the header into its 16-byte layout.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..8].copy_from_slice(&self.magic);
        out[8..12].copy_from_slice(&self.summary_offset.to_le_bytes());
        out[12..].copy_from_slice(&self.spawn_groups_offset.to_le_bytes());
        out
    }
}

impl Default for DemoHeader {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            summary_offset: 0,
            spawn_groups_offset: 0,
        }
    }
}
