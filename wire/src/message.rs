//! Inner messages carried by a packet payload.

use bitstream::{BitReader, BitWriter};

use crate::error::{LimitKind, WireError, WireResult};
use crate::limits::Limits;

/// Inner message kinds the core decodes; all others stay opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    NetTick,
    ServerInfo,
    CreateStringTable,
    UpdateStringTable,
    ClearAllStringTables,
    PacketEntities,
    Other(u32),
}

impl MessageKind {
    /// Maps a numeric message type.
    #[must_use]
    pub const fn from_id(id: u32) -> Self {
        match id {
            4 => Self::NetTick,
            40 => Self::ServerInfo,
            44 => Self::CreateStringTable,
            45 => Self::UpdateStringTable,
            51 => Self::ClearAllStringTables,
            55 => Self::PacketEntities,
            other => Self::Other(other),
        }
    }

    /// Returns the numeric message type.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::NetTick => 4,
            Self::ServerInfo => 40,
            Self::CreateStringTable => 44,
            Self::UpdateStringTable => 45,
            Self::ClearAllStringTables => 51,
            Self::PacketEntities => 55,
            Self::Other(id) => id,
        }
    }

    /// Stable name for stats and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NetTick => "net_Tick",
            Self::ServerInfo => "svc_ServerInfo",
            Self::CreateStringTable => "svc_CreateStringTable",
            Self::UpdateStringTable => "svc_UpdateStringTable",
            Self::ClearAllStringTables => "svc_ClearAllStringTables",
            Self::PacketEntities => "svc_PacketEntities",
            Self::Other(_) => "other",
        }
    }
}

/// One undecoded inner message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerMessage {
    pub type_id: u32,
    pub payload: Vec<u8>,
}

impl InnerMessage {
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        MessageKind::from_id(self.type_id)
    }
}

/// Single-pass iterator over the `[ubit_var type][varu32 size][bytes]`
/// records of a packet payload.
///
/// Iteration stops once fewer than 8 bits remain. After the first error the
/// iterator is fused.
#[derive(Debug)]
pub struct Messages<'a> {
    reader: BitReader<'a>,
    max_message_bytes: usize,
    failed: bool,
}

/// Splits a packet payload into inner messages.
#[must_use]
pub fn messages<'a>(data: &'a [u8], limits: &Limits) -> Messages<'a> {
    Messages {
        reader: BitReader::new(data),
        max_message_bytes: limits.max_message_bytes,
        failed: false,
    }
}

impl Messages<'_> {
    fn read_next(&mut self) -> WireResult<InnerMessage> {
        let type_id = self.reader.read_ubit_var()?;
        let size = self.reader.read_varu32()? as usize;
        if size > self.max_message_bytes {
            return Err(WireError::LimitsExceeded {
                kind: LimitKind::MessageBytes,
                limit: self.max_message_bytes,
                actual: size,
            });
        }
        let available = self.reader.bits_remaining() / 8;
        if size > available {
            return Err(WireError::MessageTruncated {
                type_id,
                size,
                available,
            });
        }
        let payload = self.reader.read_bytes(size)?;
        Ok(InnerMessage { type_id, payload })
    }
}

impl Iterator for Messages<'_> {
    type Item = WireResult<InnerMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.bits_remaining() < 8 {
            return None;
        }
        let result = self.read_next();
        self.failed = result.is_err();
        Some(result)
    }
}

/// Appends one inner message record to `writer`.
pub fn encode_message(writer: &mut BitWriter, kind: MessageKind, payload: &[u8]) {
    writer.write_ubit_var(kind.id());
    writer.write_varu32(payload.len() as u32);
    writer.write_bytes(payload);
}
