//! Applies decoded packets to the [`Demo`] in stream order and runs hooks.

use codec::{CodecLimits, EntityEvent, EntityHandle};
use tracing::{trace, warn};

use crate::demo::{Demo, ServerInfo};
use crate::error::{ParserError, ParserResult};
use crate::intercept::{Hooks, IdSource, InterceptStage, Interceptor, InterceptorId};
use crate::packet::{DecodedPacket, DemoPacket, EntityPacket, Message};
use crate::protocol::SchemaUpdate;
use crate::stats::PacketStats;

/// Sequential consumer of decoded packets.
///
/// Only this type mutates the [`Demo`]; every packet it receives must
/// already be in sequence order.
#[derive(Debug)]
pub struct Dispatcher {
    demo: Demo,
    pre: Hooks,
    post: Hooks,
    ids: IdSource,
    limits: CodecLimits,
}

impl Dispatcher {
    #[must_use]
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            demo: Demo::new(limits.clone()),
            pre: Hooks::default(),
            post: Hooks::default(),
            ids: IdSource::default(),
            limits,
        }
    }

    #[must_use]
    pub const fn demo(&self) -> &Demo {
        &self.demo
    }

    pub fn demo_mut(&mut self) -> &mut Demo {
        &mut self.demo
    }

    pub fn register_pre(&mut self, interceptor: Interceptor) -> InterceptorId {
        let id = self.ids.next();
        self.pre.register(id, interceptor);
        id
    }

    pub fn register_post(&mut self, interceptor: Interceptor) -> InterceptorId {
        let id = self.ids.next();
        self.post.register(id, interceptor);
        id
    }

    pub fn unregister_pre(&mut self, id: InterceptorId) -> bool {
        self.pre.unregister(id)
    }

    pub fn unregister_post(&mut self, id: InterceptorId) -> bool {
        self.post.unregister(id)
    }

    /// Applies one packet.
    ///
    /// Schema and invariant failures abort; anything the demo state cannot
    /// absorb is counted in `stats` and skipped.
    pub fn dispatch(&mut self, packet: &DecodedPacket, stats: &mut PacketStats) -> ParserResult<()> {
        stats.record(packet);
        self.pre.demo_packet(packet, &self.demo);

        if packet.tick != u32::MAX {
            self.demo.tick = packet.tick;
        }
        match &packet.packet {
            DemoPacket::FileHeader(header) => self.demo.header = Some(header.clone()),
            DemoPacket::SendTables(tables) => {
                self.demo
                    .schema
                    .apply(&SchemaUpdate::SendTables(tables.clone()))?;
            }
            DemoPacket::ClassInfo(info) => {
                self.demo.schema.apply(&SchemaUpdate::ClassInfo(info.clone()))?;
            }
            DemoPacket::StringTables(snapshot)
            | DemoPacket::FullPacket {
                string_tables: Some(snapshot),
                ..
            } => self.demo.string_tables.apply_snapshot(snapshot),
            _ => {}
        }

        for message in packet.messages() {
            self.pre.message_packet(message, &self.demo);
            self.apply(message, stats)?;
            self.post.message_packet(message, &self.demo);
        }

        self.post.demo_packet(packet, &self.demo);
        Ok(())
    }

    fn apply(&mut self, message: &Message, stats: &mut PacketStats) -> ParserResult<()> {
        let result = match message {
            Message::NetTick(tick) => {
                self.demo.tick = tick.tick;
                Ok(())
            }
            Message::ServerInfo(info) => {
                if let Some(max) = u32::try_from(info.max_classes).ok().filter(|&m| m > 0) {
                    self.demo.schema.set_max_classes(max);
                }
                self.demo.server_info = Some(ServerInfo::from(info));
                Ok(())
            }
            Message::CreateStringTable(msg) => self.demo.string_tables.create(msg, &self.limits).map(drop),
            Message::UpdateStringTable(msg) => self.demo.string_tables.update(msg, &self.limits).map(drop),
            Message::ClearAllStringTables => {
                self.demo.string_tables.clear();
                Ok(())
            }
            Message::PacketEntities(entities) => return self.apply_entities(entities, stats),
            Message::Unknown(_) | Message::Unparsed { .. } => Ok(()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => skip(message, err.into(), stats),
        }
    }

    fn apply_entities(&mut self, packet: &EntityPacket, stats: &mut PacketStats) -> ParserResult<()> {
        let preview = self.pre.has(InterceptStage::EntityPacket);
        for packed in &packet.deltas {
            let delta = packed.unpack()?;
            if preview {
                let event = EntityEvent {
                    op: delta.op,
                    handle: EntityHandle::new(delta.index, delta.serial),
                    class_id: delta.class_id,
                    mutations: delta.mutations.clone(),
                };
                self.pre.entity_packet(&event, &self.demo);
            }
            match self.demo.entities.apply(delta, self.demo.schema.classes()) {
                Ok(event) => {
                    stats.entity_ops += 1;
                    self.post.entity_packet(&event, &self.demo);
                }
                Err(err) => {
                    let err = ParserError::from(err);
                    if err.kind().is_fatal() {
                        return Err(err);
                    }
                    warn!(index = packed.index, op = packed.op.name(), error = %err, "entity delta skipped");
                    stats.skip("entity delta");
                }
            }
        }
        trace!(deltas = packet.deltas.len(), live = self.demo.entities.len(), "entities applied");
        Ok(())
    }
}

fn skip(message: &Message, err: ParserError, stats: &mut PacketStats) -> ParserResult<()> {
    if err.kind().is_fatal() {
        return Err(err);
    }
    let name = message.kind().map_or("message", wire::MessageKind::name);
    warn!(kind = name, error = %err, "message skipped");
    stats.skip(name);
    Ok(())
}
