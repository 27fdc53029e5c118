//! Entity dumps of a small synthetic demo.

use bitstream::BitWriter;
use pipeline::PipelineConfig;
use prost::Message as _;
use s2demo_tools::{dump_entities, format_entities_pretty, EntityFilter};
use schema::{FieldPathEncoder, FieldValue};
use wire::proto::c_demo_class_info::ClassT;
use wire::proto::{
    CDemoClassInfo, CDemoPacket, CDemoSendTables, CsvcMsgFlattenedSerializer,
    CsvcMsgPacketEntities, CsvcMsgServerInfo, ProtoFlattenedSerializerFieldT,
    ProtoFlattenedSerializerT,
};
use wire::{encode_frame, encode_message, DemoCommand, DemoHeader, DemoSource, MessageKind};

fn send_tables() -> CDemoSendTables {
    let symbols = ["CDOTA_BaseNPC", "int32", "m_iHealth", "CDOTA_Tower", "bool", "m_bInvulnerable"];
    let field = |type_sym, name_sym| ProtoFlattenedSerializerFieldT {
        var_type_sym: type_sym,
        var_name_sym: name_sym,
        ..ProtoFlattenedSerializerFieldT::default()
    };
    let flattened = CsvcMsgFlattenedSerializer {
        symbols: symbols.iter().map(|s| (*s).to_owned()).collect(),
        fields: vec![field(1, 2), field(4, 5)],
        serializers: vec![
            ProtoFlattenedSerializerT {
                serializer_name_sym: 0,
                serializer_version: 0,
                fields_index: vec![0],
            },
            ProtoFlattenedSerializerT {
                serializer_name_sym: 3,
                serializer_version: 0,
                fields_index: vec![0, 1],
            },
        ],
    };
    CDemoSendTables {
        data: flattened.encode_length_delimited_to_vec(),
    }
}

fn class_info() -> CDemoClassInfo {
    let class = |id, name: &str| ClassT {
        class_id: id,
        network_name: name.into(),
        table_name: String::new(),
    };
    CDemoClassInfo {
        classes: vec![class(1, "CDOTA_BaseNPC"), class(2, "CDOTA_Tower")],
    }
}

fn create(w: &mut BitWriter, class: u32, serial: u32, health: i32, flag: Option<bool>) {
    w.write_ubit_var(0);
    w.write_bits(0b10, 2).unwrap();
    w.write_bits(class, 2).unwrap();
    w.write_bits(serial, 17).unwrap();
    w.write_varu32(0);
    let mut enc = FieldPathEncoder::new();
    enc.write(w, &[0]).unwrap();
    if flag.is_some() {
        enc.write(w, &[1]).unwrap();
    }
    enc.finish(w).unwrap();
    w.write_vars32(health);
    if let Some(flag) = flag {
        w.write_bit(flag);
    }
}

/// Creates: slot 0 an NPC, slot 1 a tower, slot 2 an NPC that then leaves.
fn entity_data() -> Vec<u8> {
    let mut w = BitWriter::new();
    create(&mut w, 1, 1, 550, None);
    create(&mut w, 2, 2, 1800, Some(true));
    create(&mut w, 1, 3, 300, None);
    w.finish()
}

fn demo() -> Vec<u8> {
    let mut out = DemoHeader::default().encode().to_vec();
    let info = CsvcMsgServerInfo {
        max_classes: 3,
        ..CsvcMsgServerInfo::default()
    };
    let mut w = BitWriter::new();
    encode_message(&mut w, MessageKind::ServerInfo, &info.encode_to_vec());
    let signon = CDemoPacket { data: w.finish() };
    encode_frame(&mut out, DemoSource::Replay, DemoCommand::SignonPacket, false, 0, &signon.encode_to_vec());
    encode_frame(&mut out, DemoSource::Replay, DemoCommand::SendTables, false, 0, &send_tables().encode_to_vec());
    encode_frame(&mut out, DemoSource::Replay, DemoCommand::ClassInfo, false, 0, &class_info().encode_to_vec());

    let entities = CsvcMsgPacketEntities {
        updated_entries: 3,
        is_delta: true,
        entity_data: entity_data(),
        ..CsvcMsgPacketEntities::default()
    };
    let mut w = BitWriter::new();
    encode_message(&mut w, MessageKind::PacketEntities, &entities.encode_to_vec());
    let packet = CDemoPacket { data: w.finish() };
    encode_frame(&mut out, DemoSource::Replay, DemoCommand::Packet, false, 1, &packet.encode_to_vec());

    let mut w = BitWriter::new();
    w.write_ubit_var(2);
    w.write_bits(0b01, 2).unwrap();
    let leave = CsvcMsgPacketEntities {
        updated_entries: 1,
        is_delta: true,
        entity_data: w.finish(),
        ..CsvcMsgPacketEntities::default()
    };
    let mut w = BitWriter::new();
    encode_message(&mut w, MessageKind::PacketEntities, &leave.encode_to_vec());
    let packet = CDemoPacket { data: w.finish() };
    encode_frame(&mut out, DemoSource::Replay, DemoCommand::Packet, false, 2, &packet.encode_to_vec());
    encode_frame(&mut out, DemoSource::Replay, DemoCommand::Stop, false, 3, &[]);
    out
}

#[test]
fn dumps_active_entities_with_named_fields() {
    let data = demo();
    let dumps = dump_entities(
        data.as_slice(),
        PipelineConfig::inline(),
        DemoSource::Replay,
        &EntityFilter::default(),
    )
    .unwrap();
    assert_eq!(dumps.len(), 2);
    assert_eq!(dumps[0].class, "CDOTA_BaseNPC");
    assert_eq!(dumps[0].fields["m_iHealth"], FieldValue::Signed(550));
    assert_eq!(dumps[1].class, "CDOTA_Tower");
    assert_eq!(dumps[1].fields["m_bInvulnerable"], FieldValue::Bool(true));

    let pretty = format_entities_pretty(&dumps);
    assert!(pretty.contains("#1 CDOTA_Tower serial 2"));
    assert!(pretty.contains("  m_iHealth = 1800"));
}

#[test]
fn filters_by_class_and_limit() {
    let data = demo();
    let filter = EntityFilter {
        class: Some("CDOTA_BaseNPC".into()),
        limit: None,
        include_inactive: true,
    };
    let dumps = dump_entities(data.as_slice(), PipelineConfig::for_testing(), DemoSource::Replay, &filter)
        .unwrap();
    assert_eq!(dumps.iter().map(|d| d.index).collect::<Vec<_>>(), [0, 2]);
    assert!(!dumps[1].active);
    assert!(format_entities_pretty(&dumps).contains("(inactive)"));

    let filter = EntityFilter {
        limit: Some(1),
        ..EntityFilter::default()
    };
    let dumps = dump_entities(data.as_slice(), PipelineConfig::inline(), DemoSource::Replay, &filter)
        .unwrap();
    assert_eq!(dumps.len(), 1);
}

#[test]
fn dumps_serialize_as_json_objects() {
    let data = demo();
    let dumps = dump_entities(
        data.as_slice(),
        PipelineConfig::inline(),
        DemoSource::Replay,
        &EntityFilter::default(),
    )
    .unwrap();
    let json = serde_json::to_value(&dumps).unwrap();
    assert_eq!(json[0]["fields"]["m_iHealth"], 550);
    assert_eq!(json[1]["fields"]["m_bInvulnerable"], true);
}
