//! Decoded demo packets and inner messages.

use std::sync::Arc;

use wire::proto::{
    self, CDemoClassInfo, CDemoFileHeader, CDemoSendTables, CDemoStringTables, CnetMsgTick,
    CsvcMsgCreateStringTable, CsvcMsgServerInfo, CsvcMsgUpdateStringTable,
};
use wire::{DemoCommand, InnerMessage, MessageKind, RawPacket};

use crate::protocol::PackedDelta;

/// A demo packet after decoding, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub sequence: u64,
    pub tick: u32,
    pub command: DemoCommand,
    pub packet: DemoPacket,
}

impl DecodedPacket {
    /// Messages carried by a packet; empty for control packets.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        match &self.packet {
            DemoPacket::Packet(messages) | DemoPacket::FullPacket { messages, .. } => messages,
            _ => &[],
        }
    }
}

/// Outer packet contents.
///
/// Schema-bearing protos are shared because every worker receives them.
#[derive(Debug, Clone, PartialEq)]
pub enum DemoPacket {
    Stop,
    FileHeader(CDemoFileHeader),
    SyncTick,
    SendTables(Arc<CDemoSendTables>),
    ClassInfo(Arc<CDemoClassInfo>),
    StringTables(Arc<CDemoStringTables>),
    /// A regular or signon packet.
    Packet(Vec<Message>),
    /// A packet plus the complete string-table state at that point.
    FullPacket {
        string_tables: Option<Arc<CDemoStringTables>>,
        messages: Vec<Message>,
    },
    /// A command the decoder does not model; payload kept decompressed.
    Unknown { payload: Vec<u8> },
    /// The payload could not be decoded.
    Unparsed { payload: Vec<u8>, reason: String },
}

/// Inner message contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    NetTick(CnetMsgTick),
    ServerInfo(CsvcMsgServerInfo),
    CreateStringTable(CsvcMsgCreateStringTable),
    UpdateStringTable(CsvcMsgUpdateStringTable),
    ClearAllStringTables,
    PacketEntities(EntityPacket),
    /// Any other message, left for an external schema.
    Unknown(InnerMessage),
    /// A message that failed to decode. `type_id` is `None` when the
    /// container itself was malformed.
    Unparsed {
        type_id: Option<u32>,
        payload: Vec<u8>,
        reason: String,
    },
}

impl Message {
    /// Kind of the message, if known.
    #[must_use]
    pub const fn kind(&self) -> Option<MessageKind> {
        Some(match self {
            Self::NetTick(_) => MessageKind::NetTick,
            Self::ServerInfo(_) => MessageKind::ServerInfo,
            Self::CreateStringTable(_) => MessageKind::CreateStringTable,
            Self::UpdateStringTable(_) => MessageKind::UpdateStringTable,
            Self::ClearAllStringTables => MessageKind::ClearAllStringTables,
            Self::PacketEntities(_) => MessageKind::PacketEntities,
            Self::Unknown(inner) => inner.kind(),
            Self::Unparsed {
                type_id: Some(id), ..
            } => MessageKind::from_id(*id),
            Self::Unparsed { type_id: None, .. } => return None,
        })
    }

    pub(crate) fn unparsed(inner: InnerMessage, reason: impl ToString) -> Self {
        Self::Unparsed {
            type_id: Some(inner.type_id),
            payload: inner.payload,
            reason: reason.to_string(),
        }
    }
}

/// Decoded entity records from one `PacketEntities` message.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPacket {
    pub max_entries: i32,
    pub updated_entries: i32,
    pub is_delta: bool,
    pub deltas: Vec<PackedDelta>,
}

/// Decodes a packet that carries no entity data.
///
/// Protobuf and decompression failures become [`DemoPacket::Unparsed`].
#[must_use]
pub fn decode_light(raw: &RawPacket) -> DecodedPacket {
    let command = raw.command();
    let packet = match raw.decompressed() {
        Ok(payload) => decode_control(command, &payload),
        Err(err) => DemoPacket::Unparsed {
            payload: raw.payload.clone(),
            reason: err.to_string(),
        },
    };
    DecodedPacket {
        sequence: raw.sequence,
        tick: raw.tick,
        command,
        packet,
    }
}

fn decode_control(command: DemoCommand, payload: &[u8]) -> DemoPacket {
    let decoded = match command {
        DemoCommand::Stop => Ok(DemoPacket::Stop),
        DemoCommand::SyncTick => Ok(DemoPacket::SyncTick),
        DemoCommand::FileHeader => {
            proto::decode::<CDemoFileHeader>("CDemoFileHeader", payload).map(DemoPacket::FileHeader)
        }
        DemoCommand::SendTables => proto::decode::<CDemoSendTables>("CDemoSendTables", payload)
            .map(|p| DemoPacket::SendTables(Arc::new(p))),
        DemoCommand::ClassInfo => proto::decode::<CDemoClassInfo>("CDemoClassInfo", payload)
            .map(|p| DemoPacket::ClassInfo(Arc::new(p))),
        DemoCommand::StringTables => {
            proto::decode::<CDemoStringTables>("CDemoStringTables", payload)
                .map(|p| DemoPacket::StringTables(Arc::new(p)))
        }
        _ => Ok(DemoPacket::Unknown {
            payload: payload.to_vec(),
        }),
    };
    decoded.unwrap_or_else(|err| DemoPacket::Unparsed {
        payload: payload.to_vec(),
        reason: err.to_string(),
    })
}
