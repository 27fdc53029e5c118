//! Raw packets and the demo command catalog.

use std::borrow::Cow;

use bitstream::varint;

use crate::error::{WireError, WireResult};

/// Envelope type bit marking a Snappy-compressed payload.
pub const COMPRESSED_FLAG: u32 = 64;

/// Where a byte stream comes from; the two sources frame envelopes differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DemoSource {
    /// A recorded replay file: 16-byte header, varint tick and length.
    #[default]
    Replay,
    /// A live broadcast fragment: fixed little-endian tick and length.
    Broadcast,
}

/// Outer demo commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DemoCommand {
    Stop,
    FileHeader,
    FileInfo,
    SyncTick,
    SendTables,
    ClassInfo,
    StringTables,
    Packet,
    SignonPacket,
    ConsoleCmd,
    CustomData,
    CustomDataCallbacks,
    UserCmd,
    FullPacket,
    SaveGame,
    SpawnGroups,
    AnimationData,
    AnimationHeader,
    Unknown(u32),
}

impl DemoCommand {
    /// Maps a numeric command id (without the compression flag).
    #[must_use]
    pub const fn from_id(id: u32) -> Self {
        match id {
            0 => Self::Stop,
            1 => Self::FileHeader,
            2 => Self::FileInfo,
            3 => Self::SyncTick,
            4 => Self::SendTables,
            5 => Self::ClassInfo,
            6 => Self::StringTables,
            7 => Self::Packet,
            8 => Self::SignonPacket,
            9 => Self::ConsoleCmd,
            10 => Self::CustomData,
            11 => Self::CustomDataCallbacks,
            12 => Self::UserCmd,
            13 => Self::FullPacket,
            14 => Self::SaveGame,
            15 => Self::SpawnGroups,
            16 => Self::AnimationData,
            17 => Self::AnimationHeader,
            other => Self::Unknown(other),
        }
    }

    /// Returns the numeric command id.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::Stop => 0,
            Self::FileHeader => 1,
            Self::FileInfo => 2,
            Self::SyncTick => 3,
            Self::SendTables => 4,
            Self::ClassInfo => 5,
            Self::StringTables => 6,
            Self::Packet => 7,
            Self::SignonPacket => 8,
            Self::ConsoleCmd => 9,
            Self::CustomData => 10,
            Self::CustomDataCallbacks => 11,
            Self::UserCmd => 12,
            Self::FullPacket => 13,
            Self::SaveGame => 14,
            Self::SpawnGroups => 15,
            Self::AnimationData => 16,
            Self::AnimationHeader => 17,
            Self::Unknown(id) => id,
        }
    }

    /// Returns `true` for commands whose decode may embed entity deltas.
    #[must_use]
    pub const fn is_heavy(self) -> bool {
        matches!(self, Self::Packet | Self::SignonPacket | Self::FullPacket)
    }

    /// Stable name for stats and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stop => "DEM_Stop",
            Self::FileHeader => "DEM_FileHeader",
            Self::FileInfo => "DEM_FileInfo",
            Self::SyncTick => "DEM_SyncTick",
            Self::SendTables => "DEM_SendTables",
            Self::ClassInfo => "DEM_ClassInfo",
            Self::StringTables => "DEM_StringTables",
            Self::Packet => "DEM_Packet",
            Self::SignonPacket => "DEM_SignonPacket",
            Self::ConsoleCmd => "DEM_ConsoleCmd",
            Self::CustomData => "DEM_CustomData",
            Self::CustomDataCallbacks => "DEM_CustomDataCallbacks",
            Self::UserCmd => "DEM_UserCmd",
            Self::FullPacket => "DEM_FullPacket",
            Self::SaveGame => "DEM_SaveGame",
            Self::SpawnGroups => "DEM_SpawnGroups",
            Self::AnimationData => "DEM_AnimationData",
            Self::AnimationHeader => "DEM_AnimationHeader",
            Self::Unknown(_) => "DEM_Unknown",
        }
    }
}

/// One framed envelope, exactly as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Position in the stream, strictly increasing from zero.
    pub sequence: u64,
    /// Command id with the compression flag stripped.
    pub type_id: u32,
    pub source: DemoSource,
    pub tick: u32,
    pub compressed: bool,
    pub payload: Vec<u8>,
}

impl RawPacket {
    /// Returns the decoded command kind.
    #[must_use]
    pub const fn command(&self) -> DemoCommand {
        DemoCommand::from_id(self.type_id)
    }

    /// Returns the payload, Snappy-decompressed if the envelope was flagged.
    pub fn decompressed(&self) -> WireResult<Cow<'_, [u8]>> {
        if self.compressed {
            decompress(&self.payload).map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(&self.payload))
        }
    }
}

/// Decompresses a raw Snappy block.
pub fn decompress(data: &[u8]) -> WireResult<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(data)
        .map_err(|err| WireError::Decompress {
            reason: err.to_string(),
        })
}

/// Appends one framed envelope to `out` using the framing of `source`.
///
/// The replay file header is not written; see
/// [`DemoHeader::encode`](crate::DemoHeader::encode).
pub fn encode_frame(
    out: &mut Vec<u8>,
    source: DemoSource,
    command: DemoCommand,
    compressed: bool,
    tick: u32,
    payload: &[u8],
) {
    let type_id = if compressed {
        command.id() | COMPRESSED_FLAG
    } else {
        command.id()
    };
    varint::encode_u32(type_id, out);
    match source {
        DemoSource::Replay => {
            varint::encode_u32(tick, out);
            varint::encode_u32(payload.len() as u32, out);
        }
        DemoSource::Broadcast => {
            out.extend_from_slice(&tick.to_le_bytes());
            out.push(0);
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        }
    }
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_roundtrip() {
        for id in 0..=20 {
            assert_eq!(DemoCommand::from_id(id).id(), id);
        }
        assert_eq!(DemoCommand::from_id(99), DemoCommand::Unknown(99));
    }

    #[test]
    fn heavy_commands() {
        assert!(DemoCommand::Packet.is_heavy());
        assert!(DemoCommand::SignonPacket.is_heavy());
        assert!(DemoCommand::FullPacket.is_heavy());
        assert!(!DemoCommand::SendTables.is_heavy());
        assert!(!DemoCommand::Unknown(7000).is_heavy());
    }

    #[test]
    fn compressed_payload_is_inflated() {
        let plain = b"entity data entity data entity data".to_vec();
        let packed = snap::raw::Encoder::new().compress_vec(&plain).unwrap();
        let packet = RawPacket {
            sequence: 0,
            type_id: DemoCommand::Packet.id(),
            source: DemoSource::Replay,
            tick: 1,
            compressed: true,
            payload: packed,
        };
        assert_eq!(packet.decompressed().unwrap().as_ref(), plain.as_slice());
    }

    #[test]
    fn garbage_snappy_is_an_error() {
        let err = decompress(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]).unwrap_err();
        assert!(matches!(err, WireError::Decompress { .. }));
    }

    #[test]
    fn broadcast_frame_layout() {
        let mut out = Vec::new();
        encode_frame(
            &mut out,
            DemoSource::Broadcast,
            DemoCommand::Packet,
            false,
            0x0102,
            &[9, 9],
        );
        assert_eq!(out, vec![7, 0x02, 0x01, 0, 0, 0, 2, 0, 0, 0, 9, 9]);
    }
}
