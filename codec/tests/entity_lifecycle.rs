//! Decoder and store driven together over packet sequences.

use std::collections::BTreeMap;
use std::rc::Rc;

use bitstream::BitWriter;
use codec::{CodecLimits, EntityDecoder, EntityHandle, EntityOp, EntityStore, StringTables};
use proptest::prelude::*;
use schema::{ClassInfo, ClassRegistry, Field, FieldPathEncoder, FieldProps, FieldValue, Serializer};
use wire::proto::CsvcMsgPacketEntities;

const CLASS: i32 = 1;
const SLOTS: u32 = 16;

fn classes() -> ClassRegistry {
    let field = |name: &str, ty: &str| {
        Rc::new(Field::from_declaration(name, ty, &FieldProps::default(), None).unwrap())
    };
    let mut classes = ClassRegistry::default();
    classes.insert(ClassInfo {
        id: CLASS,
        name: "CDOTA_BaseNPC".into(),
        serializer: Rc::new(Serializer::new(
            "CDOTA_BaseNPC",
            0,
            vec![
                field("m_iHealth", "int32"),
                field("m_hOwnerEntity", "CHandle< CBaseEntity >"),
            ],
        )),
    });
    classes.set_max_classes(2);
    classes
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Create { serial: u32, health: i32 },
    Update { health: i32 },
    Leave,
    Delete,
}

/// Builds one `PacketEntities` message from ops in ascending slot order.
struct PacketBuilder {
    writer: BitWriter,
    last: i64,
    count: i32,
}

impl PacketBuilder {
    fn new() -> Self {
        Self {
            writer: BitWriter::new(),
            last: -1,
            count: 0,
        }
    }

    fn push(&mut self, index: u32, op: Op) {
        let skip = i64::from(index) - self.last - 1;
        self.last = i64::from(index);
        self.count += 1;
        let w = &mut self.writer;
        w.write_ubit_var(skip as u32);
        match op {
            Op::Create { serial, health } => {
                w.write_bits(0b10, 2).unwrap();
                w.write_bits(CLASS as u32, 2).unwrap();
                w.write_bits(serial, 17).unwrap();
                w.write_varu32(0);
                health_field(w, health);
            }
            Op::Update { health } => {
                w.write_bits(0b00, 2).unwrap();
                health_field(w, health);
            }
            Op::Leave => w.write_bits(0b01, 2).unwrap(),
            Op::Delete => w.write_bits(0b11, 2).unwrap(),
        }
    }

    fn finish(self, is_delta: bool) -> CsvcMsgPacketEntities {
        CsvcMsgPacketEntities {
            updated_entries: self.count,
            is_delta,
            entity_data: self.writer.finish(),
            ..Default::default()
        }
    }
}

fn health_field(w: &mut BitWriter, health: i32) {
    let mut enc = FieldPathEncoder::new();
    enc.write(w, &[0]).unwrap();
    enc.finish(w).unwrap();
    w.write_vars32(health);
}

#[test]
fn owner_handle_resolves_across_entities() {
    let classes = classes();
    let tables = StringTables::new();
    let mut decoder = EntityDecoder::new(CodecLimits::for_testing());
    let mut store = EntityStore::new(CodecLimits::for_testing());

    let mut w = BitWriter::new();
    // slot 0: owner
    w.write_ubit_var(0);
    w.write_bits(0b10, 2).unwrap();
    w.write_bits(CLASS as u32, 2).unwrap();
    w.write_bits(3, 17).unwrap();
    w.write_varu32(0);
    health_field(&mut w, 500);
    // slot 1: owned by slot 0
    w.write_ubit_var(0);
    w.write_bits(0b10, 2).unwrap();
    w.write_bits(CLASS as u32, 2).unwrap();
    w.write_bits(1, 17).unwrap();
    w.write_varu32(0);
    let mut enc = FieldPathEncoder::new();
    enc.write(&mut w, &[1]).unwrap();
    enc.finish(&mut w).unwrap();
    w.write_varu32(EntityHandle::new(0, 3).raw());

    let msg = CsvcMsgPacketEntities {
        updated_entries: 2,
        entity_data: w.finish(),
        ..Default::default()
    };
    for delta in decoder.decode(&msg, &classes, &tables).unwrap() {
        store.apply(delta, &classes).unwrap();
    }

    let owner = store.follow_handle(1, "m_hOwnerEntity").unwrap().unwrap();
    assert_eq!(owner.handle(), EntityHandle::new(0, 3));
    assert_eq!(owner.class_name(), "CDOTA_BaseNPC");
}

#[test]
fn events_carry_handles_and_mutations() {
    let classes = classes();
    let tables = StringTables::new();
    let mut decoder = EntityDecoder::new(CodecLimits::for_testing());
    let mut store = EntityStore::new(CodecLimits::for_testing());

    let mut packet = PacketBuilder::new();
    packet.push(7, Op::Create { serial: 2, health: 10 });
    let msg = packet.finish(false);

    let events: Vec<_> = decoder
        .decode(&msg, &classes, &tables)
        .unwrap()
        .into_iter()
        .map(|d| store.apply(d, &classes).unwrap())
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].op, EntityOp::Create);
    assert_eq!(events[0].handle, EntityHandle::new(7, 2));
    assert_eq!(events[0].mutations[0].value, FieldValue::Signed(10));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Modeled {
    serial: u32,
    health: i32,
    active: bool,
}

proptest! {
    #[test]
    fn store_tracks_model(packets in prop::collection::vec(
        prop::collection::vec(any::<u8>(), SLOTS as usize),
        1..8,
    )) {
        let classes = classes();
        let tables = StringTables::new();
        let mut decoder = EntityDecoder::new(CodecLimits::for_testing());
        let mut store = EntityStore::new(CodecLimits::for_testing());
        let mut model: BTreeMap<u32, Modeled> = BTreeMap::new();
        let mut next_serial = 1u32;

        for choices in packets {
            let mut packet = PacketBuilder::new();
            for (index, &choice) in (0..SLOTS).zip(&choices) {
                let health = i32::from(choice) * 3 - 100;
                let known = model.contains_key(&index);
                let op = match (choice % 5, known) {
                    (1, _) => {
                        next_serial += 1;
                        model.insert(index, Modeled { serial: next_serial, health, active: true });
                        Op::Create { serial: next_serial, health }
                    }
                    (2, true) => {
                        let m = model.get_mut(&index).unwrap();
                        m.health = health;
                        m.active = true;
                        Op::Update { health }
                    }
                    (3, true) => {
                        model.get_mut(&index).unwrap().active = false;
                        Op::Leave
                    }
                    (4, true) => {
                        model.remove(&index);
                        Op::Delete
                    }
                    _ => continue,
                };
                packet.push(index, op);
            }

            let msg = packet.finish(true);
            for delta in decoder.decode(&msg, &classes, &tables).unwrap() {
                store.apply(delta, &classes).unwrap();
            }

            prop_assert_eq!(store.len(), model.len());
            prop_assert_eq!(decoder.len(), model.len());
            for (&index, expected) in &model {
                let entity = store.get_mut(index).unwrap();
                prop_assert_eq!(entity.serial(), expected.serial);
                prop_assert_eq!(entity.is_active(), expected.active);
                prop_assert_eq!(
                    entity.get("m_iHealth").unwrap(),
                    Some(&FieldValue::Signed(i64::from(expected.health)))
                );
            }
        }
    }
}
