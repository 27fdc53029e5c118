//! Entity delta decoding.
//!
//! An [`EntityDecoder`] is the decode-side replica of the entity slots: it
//! remembers each slot's class and serial so updates can find their
//! serializer, and caches decoded instance baselines per class. It never
//! holds property values; those flow out as [`EntityDelta`]s for the
//! authoritative [`EntityStore`](crate::EntityStore).

use std::collections::HashMap;
use std::rc::Rc;

use bitstream::BitReader;
use schema::{decode_field_paths, ClassRegistry, FieldPath, Serializer};
use wire::proto::CsvcMsgPacketEntities;

use crate::entity::{EntityDelta, EntityMutation, EntityOp};
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;
use crate::string_table::{StringTables, INSTANCE_BASELINE_TABLE};

/// Width of the serial sent with every create.
pub const SERIAL_BITS: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    class_id: i32,
    serial: u32,
}

/// Decode-side replica of entity slots plus the instance baseline cache.
#[derive(Debug, Default)]
pub struct EntityDecoder {
    slots: HashMap<u32, Slot>,
    baselines: HashMap<i32, Rc<[EntityMutation]>>,
    baseline_revision: Option<u64>,
    paths: Vec<FieldPath>,
    limits: CodecLimits,
}

impl EntityDecoder {
    #[must_use]
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Number of occupied slots in the replica.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Forgets every slot.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Decodes one `PacketEntities` message.
    ///
    /// A non-delta message carries full state, so the replica is reset first.
    pub fn decode(
        &mut self,
        msg: &CsvcMsgPacketEntities,
        classes: &ClassRegistry,
        tables: &StringTables,
    ) -> CodecResult<Vec<EntityDelta>> {
        if !msg.is_delta {
            self.reset();
        }
        self.refresh_baselines(tables);

        let count = usize::try_from(msg.updated_entries).unwrap_or(0);
        let mut reader = BitReader::new(&msg.entity_data);
        let mut deltas = Vec::with_capacity(count);
        let mut index = u32::MAX;

        for _ in 0..count {
            index = index.wrapping_add(reader.read_ubit_var()?).wrapping_add(1);
            let command = reader.read_bits(2)?;

            if command & 1 == 0 {
                if command & 2 != 0 {
                    deltas.push(self.decode_create(&mut reader, index, classes, tables)?);
                } else {
                    let slot = *self
                        .slots
                        .get(&index)
                        .ok_or(CodecError::EntityNotFound { index })?;
                    let class = classes.get(slot.class_id)?;
                    let mut mutations = Vec::new();
                    self.read_fields(&mut reader, &class.serializer, &mut mutations)?;
                    deltas.push(EntityDelta {
                        op: EntityOp::Update,
                        index,
                        serial: slot.serial,
                        class_id: slot.class_id,
                        mutations,
                    });
                }
            } else {
                let delete = command & 2 != 0;
                let slot = if delete {
                    self.slots.remove(&index)
                } else {
                    self.slots.get(&index).copied()
                };
                let Some(slot) = slot else {
                    tracing::trace!(index, delete, "leave for empty slot");
                    continue;
                };
                deltas.push(EntityDelta {
                    op: if delete { EntityOp::Delete } else { EntityOp::Leave },
                    index,
                    serial: slot.serial,
                    class_id: slot.class_id,
                    mutations: Vec::new(),
                });
            }
        }
        Ok(deltas)
    }

    fn decode_create(
        &mut self,
        reader: &mut BitReader<'_>,
        index: u32,
        classes: &ClassRegistry,
        tables: &StringTables,
    ) -> CodecResult<EntityDelta> {
        let class_id = reader.read_bits(classes.class_id_bits())? as i32;
        let serial = reader.read_bits(SERIAL_BITS)?;
        reader.read_varu32()?;

        let class = classes.get(class_id)?;
        if !self.slots.contains_key(&index) && self.slots.len() >= self.limits.max_entities {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::Entities,
                limit: self.limits.max_entities,
                actual: self.slots.len() + 1,
            });
        }

        let baseline = self.baseline(class_id, &class.serializer, tables)?;
        let mut mutations = baseline.to_vec();
        self.read_fields(reader, &class.serializer, &mut mutations)?;
        self.slots.insert(index, Slot { class_id, serial });
        Ok(EntityDelta {
            op: EntityOp::Create,
            index,
            serial,
            class_id,
            mutations,
        })
    }

    /// Reads a field-path list followed by one value per path.
    fn read_fields(
        &mut self,
        reader: &mut BitReader<'_>,
        serializer: &Serializer,
        out: &mut Vec<EntityMutation>,
    ) -> CodecResult<()> {
        self.paths.clear();
        decode_field_paths(reader, &mut self.paths)?;
        out.reserve(self.paths.len());
        for &path in &self.paths {
            if path.len() > self.limits.max_field_path_depth {
                return Err(CodecError::LimitsExceeded {
                    kind: LimitKind::FieldPathDepth,
                    limit: self.limits.max_field_path_depth,
                    actual: path.len(),
                });
            }
            let value = serializer.resolve_decoder(path)?.decode(reader)?;
            out.push(EntityMutation { path, value });
        }
        Ok(())
    }

    /// Drops cached baselines when the baseline table changed.
    fn refresh_baselines(&mut self, tables: &StringTables) {
        let revision = tables.by_name(INSTANCE_BASELINE_TABLE).map(|t| t.revision());
        if revision != self.baseline_revision {
            if !self.baselines.is_empty() {
                tracing::trace!(cached = self.baselines.len(), "instance baselines invalidated");
            }
            self.baselines.clear();
            self.baseline_revision = revision;
        }
    }

    fn baseline(
        &mut self,
        class_id: i32,
        serializer: &Serializer,
        tables: &StringTables,
    ) -> CodecResult<Rc<[EntityMutation]>> {
        if let Some(cached) = self.baselines.get(&class_id) {
            return Ok(Rc::clone(cached));
        }
        let data = tables
            .by_name(INSTANCE_BASELINE_TABLE)
            .and_then(|t| t.get_by_key(&class_id.to_string()))
            .map(|entry| entry.value.clone())
            .unwrap_or_default();

        let mut mutations = Vec::new();
        if !data.is_empty() {
            let mut reader = BitReader::new(&data);
            self.read_fields(&mut reader, serializer, &mut mutations)?;
        }
        let baseline: Rc<[EntityMutation]> = mutations.into();
        self.baselines.insert(class_id, Rc::clone(&baseline));
        Ok(baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream::BitWriter;
    use schema::{ClassInfo, Field, FieldPathEncoder, FieldProps, FieldValue};
    use wire::proto::CsvcMsgCreateStringTable;

    const CLASS: i32 = 3;

    fn classes() -> ClassRegistry {
        let field = |name: &str, ty: &str| {
            Rc::new(Field::from_declaration(name, ty, &FieldProps::default(), None).unwrap())
        };
        let mut classes = ClassRegistry::default();
        classes.insert(ClassInfo {
            id: CLASS,
            name: "CUnit".into(),
            serializer: Rc::new(Serializer::new(
                "CUnit",
                0,
                vec![field("m_iHealth", "int32"), field("m_iTeam", "uint8")],
            )),
        });
        classes.set_max_classes(8);
        classes
    }

    /// Writes field paths then their values.
    fn fields(w: &mut BitWriter, values: &[(u16, i32)]) {
        let mut enc = FieldPathEncoder::new();
        for &(field, _) in values {
            enc.write(w, &[field]).unwrap();
        }
        enc.finish(w).unwrap();
        for &(field, value) in values {
            if field == 0 {
                w.write_vars32(value);
            } else {
                w.write_varu32(value as u32);
            }
        }
    }

    fn baseline_create(values: &[(u16, i32)]) -> CsvcMsgCreateStringTable {
        let mut value = BitWriter::new();
        fields(&mut value, values);
        let value = value.finish();

        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bit(true);
        w.write_bit(false);
        w.write_cstring(&CLASS.to_string());
        w.write_bit(true);
        w.write_bits(value.len() as u32, 17).unwrap();
        w.write_bytes(&value);

        CsvcMsgCreateStringTable {
            name: INSTANCE_BASELINE_TABLE.into(),
            num_entries: 1,
            string_data: w.finish(),
            ..Default::default()
        }
    }

    fn baseline_tables(values: &[(u16, i32)]) -> StringTables {
        let mut tables = StringTables::new();
        tables
            .create(&baseline_create(values), &CodecLimits::for_testing())
            .unwrap();
        tables
    }

    fn header(w: &mut BitWriter, skip: u32, command: u32) {
        w.write_ubit_var(skip);
        w.write_bits(command, 2).unwrap();
    }

    fn create(w: &mut BitWriter, serial: u32, values: &[(u16, i32)]) {
        w.write_bits(CLASS as u32, 4).unwrap();
        w.write_bits(serial, 17).unwrap();
        w.write_varu32(0);
        fields(w, values);
    }

    fn msg(entries: i32, is_delta: bool, data: Vec<u8>) -> CsvcMsgPacketEntities {
        CsvcMsgPacketEntities {
            updated_entries: entries,
            is_delta,
            entity_data: data,
            ..Default::default()
        }
    }

    fn values(delta: &EntityDelta) -> Vec<(Vec<u16>, FieldValue)> {
        delta
            .mutations
            .iter()
            .map(|m| (m.path.elements().to_vec(), m.value.clone()))
            .collect()
    }

    #[test]
    fn create_applies_baseline_then_packet_fields() {
        let classes = classes();
        let tables = baseline_tables(&[(0, 100), (1, 2)]);
        let mut w = BitWriter::new();
        header(&mut w, 4, 0b10);
        create(&mut w, 9, &[(0, 75)]);

        let mut decoder = EntityDecoder::new(CodecLimits::for_testing());
        let deltas = decoder.decode(&msg(1, false, w.finish()), &classes, &tables).unwrap();
        assert_eq!(deltas.len(), 1);
        let d = &deltas[0];
        assert_eq!((d.op, d.index, d.serial, d.class_id), (EntityOp::Create, 4, 9, CLASS));
        assert_eq!(
            values(d),
            [
                (vec![0], FieldValue::Signed(100)),
                (vec![1], FieldValue::Unsigned(2)),
                (vec![0], FieldValue::Signed(75)),
            ]
        );
    }

    #[test]
    fn update_leave_delete_sequence() {
        let classes = classes();
        let tables = StringTables::new();
        let mut decoder = EntityDecoder::new(CodecLimits::for_testing());

        let mut w = BitWriter::new();
        for serial in 1..=3 {
            header(&mut w, 0, 0b10);
            create(&mut w, serial, &[]);
        }
        decoder.decode(&msg(3, false, w.finish()), &classes, &tables).unwrap();
        assert_eq!(decoder.len(), 3);

        let mut w = BitWriter::new();
        header(&mut w, 0, 0b00);
        fields(&mut w, &[(1, 3)]);
        header(&mut w, 0, 0b01);
        header(&mut w, 0, 0b11);
        let deltas = decoder.decode(&msg(3, true, w.finish()), &classes, &tables).unwrap();

        let ops: Vec<_> = deltas.iter().map(|d| (d.op, d.index)).collect();
        assert_eq!(
            ops,
            [(EntityOp::Update, 0), (EntityOp::Leave, 1), (EntityOp::Delete, 2)]
        );
        assert_eq!(values(&deltas[0]), [(vec![1], FieldValue::Unsigned(3))]);
        assert_eq!(deltas[1].serial, 2);
        assert_eq!(decoder.len(), 2);
    }

    #[test]
    fn update_of_unknown_slot_fails() {
        let classes = classes();
        let mut w = BitWriter::new();
        header(&mut w, 6, 0b00);
        fields(&mut w, &[]);
        let mut decoder = EntityDecoder::new(CodecLimits::for_testing());
        let err = decoder
            .decode(&msg(1, true, w.finish()), &classes, &StringTables::new())
            .unwrap_err();
        assert_eq!(err, CodecError::EntityNotFound { index: 6 });
    }

    #[test]
    fn full_state_resets_replica() {
        let classes = classes();
        let tables = StringTables::new();
        let mut decoder = EntityDecoder::new(CodecLimits::for_testing());

        let mut w = BitWriter::new();
        header(&mut w, 0, 0b10);
        create(&mut w, 1, &[]);
        decoder.decode(&msg(1, false, w.finish()), &classes, &tables).unwrap();

        let mut w = BitWriter::new();
        header(&mut w, 5, 0b10);
        create(&mut w, 1, &[]);
        decoder.decode(&msg(1, false, w.finish()), &classes, &tables).unwrap();
        assert_eq!(decoder.len(), 1);
    }

    #[test]
    fn baseline_cache_follows_table_revision() {
        let classes = classes();
        let mut decoder = EntityDecoder::new(CodecLimits::for_testing());

        let mut w = BitWriter::new();
        header(&mut w, 0, 0b10);
        create(&mut w, 1, &[]);
        let bytes = w.finish();

        let first = decoder
            .decode(&msg(1, false, bytes.clone()), &classes, &baseline_tables(&[(0, 1)]))
            .unwrap();
        assert_eq!(values(&first[0]), [(vec![0], FieldValue::Signed(1))]);

        let tables = baseline_tables(&[(0, 2)]);
        let second = decoder.decode(&msg(1, false, bytes), &classes, &tables).unwrap();
        assert_eq!(values(&second[0]), [(vec![0], FieldValue::Signed(2))]);
    }

    #[test]
    fn baseline_cache_dropped_when_tables_are_recreated() {
        let classes = classes();
        let limits = CodecLimits::for_testing();
        let mut decoder = EntityDecoder::new(limits.clone());

        let mut w = BitWriter::new();
        header(&mut w, 0, 0b10);
        create(&mut w, 1, &[]);
        let bytes = w.finish();

        let mut tables = baseline_tables(&[(0, 1)]);
        let first = decoder.decode(&msg(1, false, bytes.clone()), &classes, &tables).unwrap();
        assert_eq!(values(&first[0]), [(vec![0], FieldValue::Signed(1))]);

        tables.clear();
        tables.create(&baseline_create(&[(0, 2)]), &limits).unwrap();

        let second = decoder.decode(&msg(1, false, bytes), &classes, &tables).unwrap();
        assert_eq!(values(&second[0]), [(vec![0], FieldValue::Signed(2))]);
    }
}
