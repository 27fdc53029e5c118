//! Decode workers.
//!
//! Each worker owns a [`Replica`]: its own serializers, classes, string
//! tables and entity slots. Registries hold `Rc` internally, so a replica
//! is built on the thread that uses it and never crosses threads; only raw
//! packets, schema protos and decoded results travel through channels.

use std::sync::Arc;

use codec::{CodecLimits, EntityDecoder, StringTables};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};
use wire::proto::{self, CDemoFullPacket, CDemoPacket, CDemoStringTables};
use wire::{messages, DemoCommand, InnerMessage, Limits, MessageKind, RawPacket};

use crate::error::{ParserError, ParserResult};
use crate::packet::{decode_light, DecodedPacket, DemoPacket, EntityPacket, Message};
use crate::protocol::{PackedDelta, SchemaUpdate, WorkerRequest, WorkerResponse};
use crate::schema_state::SchemaState;

/// Decoding state for one thread.
#[derive(Debug)]
pub struct Replica {
    schema: SchemaState,
    tables: StringTables,
    decoder: EntityDecoder,
    wire_limits: Limits,
    codec_limits: CodecLimits,
}

impl Replica {
    #[must_use]
    pub fn new(wire_limits: Limits, codec_limits: CodecLimits) -> Self {
        Self {
            schema: SchemaState::new(),
            tables: StringTables::new(),
            decoder: EntityDecoder::new(codec_limits.clone()),
            wire_limits,
            codec_limits,
        }
    }

    pub fn apply_schema(&mut self, update: &SchemaUpdate) -> ParserResult<()> {
        self.schema.apply(update)
    }

    /// Applies missed baselines, oldest first.
    pub fn resync(&mut self, baselines: &[Arc<CDemoStringTables>]) {
        for snapshot in baselines {
            self.tables.apply_snapshot(snapshot);
        }
        trace!(baselines = baselines.len(), "replica resynced");
    }

    #[must_use]
    pub const fn tables(&self) -> &StringTables {
        &self.tables
    }

    /// Live entity slots.
    #[must_use]
    pub fn entities(&self) -> usize {
        self.decoder.len()
    }

    /// Decodes a batch in order.
    ///
    /// Only schema and invariant failures are returned as errors; anything
    /// else becomes an unparsed packet or message.
    pub fn decode_batch(&mut self, packets: &[RawPacket]) -> ParserResult<Vec<DecodedPacket>> {
        packets.iter().map(|raw| self.decode(raw)).collect()
    }

    /// Decodes one packet of any kind.
    pub fn decode(&mut self, raw: &RawPacket) -> ParserResult<DecodedPacket> {
        let command = raw.command();
        if !command.is_heavy() {
            return Ok(decode_light(raw));
        }
        let payload = match raw.decompressed() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(sequence = raw.sequence, error = %err, "packet payload unreadable");
                return Ok(DecodedPacket {
                    sequence: raw.sequence,
                    tick: raw.tick,
                    command,
                    packet: DemoPacket::Unparsed {
                        payload: raw.payload.clone(),
                        reason: err.to_string(),
                    },
                });
            }
        };
        let packet = match command {
            DemoCommand::FullPacket => {
                match proto::decode::<CDemoFullPacket>("CDemoFullPacket", &payload) {
                    Ok(full) => {
                        let string_tables = full.string_table.map(Arc::new);
                        if let Some(snapshot) = &string_tables {
                            self.tables.apply_snapshot(snapshot);
                        }
                        let data = full.packet.map(|p| p.data).unwrap_or_default();
                        DemoPacket::FullPacket {
                            string_tables,
                            messages: self.decode_messages(&data)?,
                        }
                    }
                    Err(err) => unparsed(&payload, &err),
                }
            }
            _ => match proto::decode::<CDemoPacket>("CDemoPacket", &payload) {
                Ok(packet) => DemoPacket::Packet(self.decode_messages(&packet.data)?),
                Err(err) => unparsed(&payload, &err),
            },
        };
        Ok(DecodedPacket {
            sequence: raw.sequence,
            tick: raw.tick,
            command,
            packet,
        })
    }

    fn decode_messages(&mut self, data: &[u8]) -> ParserResult<Vec<Message>> {
        let mut out = Vec::new();
        for inner in messages(data, &self.wire_limits) {
            match inner {
                Ok(inner) => out.push(self.decode_message(inner)?),
                Err(err) => {
                    warn!(error = %err, "malformed message container");
                    out.push(Message::Unparsed {
                        type_id: None,
                        payload: Vec::new(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(out)
    }

    fn decode_message(&mut self, inner: InnerMessage) -> ParserResult<Message> {
        let kind = inner.kind();
        let decoded = match kind {
            MessageKind::NetTick => proto::decode("CNETMsg_Tick", &inner.payload).map(Message::NetTick),
            MessageKind::ServerInfo => {
                proto::decode("CSVCMsg_ServerInfo", &inner.payload).map(Message::ServerInfo)
            }
            MessageKind::CreateStringTable => {
                proto::decode("CSVCMsg_CreateStringTable", &inner.payload).map(Message::CreateStringTable)
            }
            MessageKind::UpdateStringTable => {
                proto::decode("CSVCMsg_UpdateStringTable", &inner.payload).map(Message::UpdateStringTable)
            }
            MessageKind::ClearAllStringTables => Ok(Message::ClearAllStringTables),
            MessageKind::PacketEntities => return self.decode_entities(inner),
            MessageKind::Other(_) => return Ok(Message::Unknown(inner)),
        };
        let message = match decoded {
            Ok(message) => message,
            Err(err) => {
                debug!(kind = kind.name(), error = %err, "message protobuf unreadable");
                return Ok(Message::unparsed(inner, err));
            }
        };

        let applied = match &message {
            Message::ServerInfo(info) => {
                if let Some(max) = u32::try_from(info.max_classes).ok().filter(|&m| m > 0) {
                    self.schema.set_max_classes(max);
                }
                Ok(())
            }
            Message::CreateStringTable(msg) => self.tables.create(msg, &self.codec_limits).map(drop),
            Message::UpdateStringTable(msg) => self.tables.update(msg, &self.codec_limits).map(drop),
            Message::ClearAllStringTables => {
                self.tables.clear();
                Ok(())
            }
            _ => Ok(()),
        };
        match applied {
            Ok(()) => Ok(message),
            Err(err) => skip(inner, err.into()),
        }
    }

    fn decode_entities(&mut self, inner: InnerMessage) -> ParserResult<Message> {
        let msg = match proto::decode::<proto::CsvcMsgPacketEntities>(
            "CSVCMsg_PacketEntities",
            &inner.payload,
        ) {
            Ok(msg) => msg,
            Err(err) => return Ok(Message::unparsed(inner, err)),
        };
        match self.decoder.decode(&msg, self.schema.classes(), &self.tables) {
            Ok(deltas) => {
                trace!(deltas = deltas.len(), is_delta = msg.is_delta, "entities decoded");
                Ok(Message::PacketEntities(EntityPacket {
                    max_entries: msg.max_entries,
                    updated_entries: msg.updated_entries,
                    is_delta: msg.is_delta,
                    deltas: deltas.into_iter().map(PackedDelta::pack).collect(),
                }))
            }
            Err(err) => skip(inner, err.into()),
        }
    }
}

/// Fatal errors propagate; the rest leave the message unparsed.
fn skip(inner: InnerMessage, err: ParserError) -> ParserResult<Message> {
    if err.kind().is_fatal() {
        return Err(err);
    }
    warn!(kind = inner.kind().name(), error = %err, "message skipped");
    Ok(Message::unparsed(inner, err))
}

fn unparsed(payload: &[u8], err: &wire::WireError) -> DemoPacket {
    warn!(error = %err, "packet protobuf unreadable");
    DemoPacket::Unparsed {
        payload: payload.to_vec(),
        reason: err.to_string(),
    }
}

/// Worker thread body. Runs until the request channel closes or the
/// orchestrator stops listening.
pub(crate) fn run(
    worker: usize,
    requests: Receiver<WorkerRequest>,
    responses: Sender<WorkerResponse>,
    wire_limits: Limits,
    codec_limits: CodecLimits,
) {
    let mut replica = Replica::new(wire_limits, codec_limits);
    debug!(worker, "worker started");
    while let Ok(request) = requests.recv() {
        let response = match request {
            WorkerRequest::Schema(update) => match replica.apply_schema(&update) {
                Ok(()) => None,
                Err(error) => Some(WorkerResponse::Failed {
                    worker,
                    slot: None,
                    error,
                }),
            },
            WorkerRequest::Resync { baselines } => {
                replica.resync(&baselines);
                None
            }
            WorkerRequest::Decode {
                slot,
                report,
                packets,
            } => Some(match replica.decode_batch(&packets) {
                Ok(packets) if report => WorkerResponse::Decoded {
                    worker,
                    slot,
                    packets,
                },
                Ok(_) => WorkerResponse::Ack { worker, slot },
                Err(error) => WorkerResponse::Failed {
                    worker,
                    slot: Some(slot),
                    error,
                },
            }),
        };
        if let Some(response) = response {
            if responses.send(response).is_err() {
                break;
            }
        }
    }
    debug!(worker, entities = replica.entities(), "worker stopped");
}
