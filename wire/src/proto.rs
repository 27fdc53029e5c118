//! Protobuf envelopes the decoder needs.
//!
//! Only the handful of demo and netmessage types that drive framing, tables
//! and entities are declared here; everything else travels as opaque bytes.
#![allow(clippy::derive_partial_eq_without_eq)]

use prost::Message;

use crate::error::{WireError, WireResult};

/// Decodes a protobuf message, tagging failures with `name`.
pub fn decode<M: Message + Default>(name: &'static str, buf: &[u8]) -> WireResult<M> {
    M::decode(buf).map_err(|err| WireError::protobuf(name, &err))
}

#[derive(Clone, PartialEq, Message)]
pub struct CDemoFileHeader {
    #[prost(string, tag = "1")]
    pub demo_file_stamp: String,
    #[prost(int32, tag = "2")]
    pub network_protocol: i32,
    #[prost(string, tag = "3")]
    pub server_name: String,
    #[prost(string, tag = "4")]
    pub client_name: String,
    #[prost(string, tag = "5")]
    pub map_name: String,
    #[prost(string, tag = "6")]
    pub game_directory: String,
    #[prost(int32, tag = "7")]
    pub fullpackets_version: i32,
}

/// Container for a bit-packed stream of inner messages.
#[derive(Clone, PartialEq, Message)]
pub struct CDemoPacket {
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

/// A packet plus the complete string-table state at that tick.
#[derive(Clone, PartialEq, Message)]
pub struct CDemoFullPacket {
    #[prost(message, optional, tag = "1")]
    pub string_table: Option<CDemoStringTables>,
    #[prost(message, optional, tag = "2")]
    pub packet: Option<CDemoPacket>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CDemoSendTables {
    /// Length-prefixed [`CsvcMsgFlattenedSerializer`].
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

impl CDemoSendTables {
    /// Decodes the embedded flattened serializer.
    pub fn flattened_serializer(&self) -> WireResult<CsvcMsgFlattenedSerializer> {
        CsvcMsgFlattenedSerializer::decode_length_delimited(self.data.as_slice())
            .map_err(|err| WireError::protobuf("CSVCMsg_FlattenedSerializer", &err))
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct CDemoClassInfo {
    #[prost(message, repeated, tag = "1")]
    pub classes: Vec<c_demo_class_info::ClassT>,
}

pub mod c_demo_class_info {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClassT {
        #[prost(int32, tag = "1")]
        pub class_id: i32,
        #[prost(string, tag = "2")]
        pub network_name: String,
        #[prost(string, tag = "3")]
        pub table_name: String,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct CDemoStringTables {
    #[prost(message, repeated, tag = "1")]
    pub tables: Vec<c_demo_string_tables::TableT>,
}

pub mod c_demo_string_tables {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ItemsT {
        #[prost(string, tag = "1")]
        pub str: String,
        #[prost(bytes = "vec", tag = "2")]
        pub data: Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TableT {
        #[prost(string, tag = "1")]
        pub table_name: String,
        #[prost(message, repeated, tag = "2")]
        pub items: Vec<ItemsT>,
        #[prost(message, repeated, tag = "3")]
        pub items_clientside: Vec<ItemsT>,
        #[prost(int32, tag = "4")]
        pub table_flags: i32,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct CnetMsgTick {
    #[prost(uint32, tag = "1")]
    pub tick: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CsvcMsgServerInfo {
    #[prost(int32, tag = "1")]
    pub protocol: i32,
    #[prost(int32, tag = "2")]
    pub server_count: i32,
    #[prost(bool, tag = "3")]
    pub is_dedicated: bool,
    #[prost(bool, tag = "4")]
    pub is_hltv: bool,
    #[prost(int32, tag = "10")]
    pub max_clients: i32,
    #[prost(int32, tag = "11")]
    pub max_classes: i32,
    #[prost(int32, tag = "12")]
    pub player_slot: i32,
    #[prost(float, tag = "13")]
    pub tick_interval: f32,
    #[prost(string, tag = "14")]
    pub game_dir: String,
    #[prost(string, tag = "15")]
    pub map_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CsvcMsgCreateStringTable {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub num_entries: i32,
    #[prost(bool, tag = "3")]
    pub user_data_fixed_size: bool,
    #[prost(int32, tag = "4")]
    pub user_data_size: i32,
    #[prost(int32, tag = "5")]
    pub user_data_size_bits: i32,
    #[prost(int32, tag = "6")]
    pub flags: i32,
    #[prost(bytes = "vec", tag = "7")]
    pub string_data: Vec<u8>,
    #[prost(int32, tag = "8")]
    pub uncompressed_size: i32,
    #[prost(bool, tag = "9")]
    pub data_compressed: bool,
    #[prost(bool, tag = "10")]
    pub using_varint_bitcounts: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct CsvcMsgUpdateStringTable {
    #[prost(int32, tag = "1")]
    pub table_id: i32,
    #[prost(int32, tag = "2")]
    pub num_changed_entries: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub string_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CsvcMsgPacketEntities {
    #[prost(int32, tag = "1")]
    pub max_entries: i32,
    #[prost(int32, tag = "2")]
    pub updated_entries: i32,
    #[prost(bool, tag = "3")]
    pub is_delta: bool,
    #[prost(bool, tag = "4")]
    pub update_baseline: bool,
    #[prost(int32, tag = "5")]
    pub baseline: i32,
    #[prost(int32, tag = "6")]
    pub delta_from: i32,
    #[prost(bytes = "vec", tag = "7")]
    pub entity_data: Vec<u8>,
    #[prost(bool, tag = "8")]
    pub pending_full_frame: bool,
    #[prost(uint32, tag = "9")]
    pub active_spawngroup_handle: u32,
    #[prost(uint32, tag = "10")]
    pub max_spawngroup_creationsequence: u32,
    #[prost(uint32, tag = "11")]
    pub last_cmd_number: u32,
    #[prost(uint32, tag = "12")]
    pub server_tick: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CsvcMsgFlattenedSerializer {
    #[prost(message, repeated, tag = "1")]
    pub serializers: Vec<ProtoFlattenedSerializerT>,
    #[prost(string, repeated, tag = "2")]
    pub symbols: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub fields: Vec<ProtoFlattenedSerializerFieldT>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoFlattenedSerializerT {
    #[prost(int32, tag = "1")]
    pub serializer_name_sym: i32,
    #[prost(int32, tag = "2")]
    pub serializer_version: i32,
    #[prost(int32, repeated, tag = "3")]
    pub fields_index: Vec<i32>,
}

/// A field definition; symbol fields index into the shared symbol list.
#[derive(Clone, PartialEq, Message)]
pub struct ProtoFlattenedSerializerFieldT {
    #[prost(int32, tag = "1")]
    pub var_type_sym: i32,
    #[prost(int32, tag = "2")]
    pub var_name_sym: i32,
    #[prost(int32, optional, tag = "3")]
    pub bit_count: Option<i32>,
    #[prost(float, optional, tag = "4")]
    pub low_value: Option<f32>,
    #[prost(float, optional, tag = "5")]
    pub high_value: Option<f32>,
    #[prost(int32, optional, tag = "6")]
    pub encode_flags: Option<i32>,
    #[prost(int32, optional, tag = "7")]
    pub field_serializer_name_sym: Option<i32>,
    #[prost(int32, optional, tag = "8")]
    pub field_serializer_version: Option<i32>,
    #[prost(int32, optional, tag = "9")]
    pub send_node_sym: Option<i32>,
    #[prost(int32, optional, tag = "10")]
    pub var_encoder_sym: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_tables_unwraps_length_prefix() {
        let serializer = CsvcMsgFlattenedSerializer {
            symbols: vec!["CBaseEntity".into(), "m_iHealth".into(), "int32".into()],
            ..Default::default()
        };
        let tables = CDemoSendTables {
            data: serializer.encode_length_delimited_to_vec(),
        };
        assert_eq!(tables.flattened_serializer().unwrap(), serializer);
    }

    #[test]
    fn decode_reports_message_name() {
        let err = decode::<CDemoPacket>("CDemoPacket", &[0x1A, 0x05, 0x01]).unwrap_err();
        assert!(err.to_string().contains("CDemoPacket"));
    }

    #[test]
    fn optional_symbol_zero_is_present() {
        let field = ProtoFlattenedSerializerFieldT {
            field_serializer_name_sym: Some(0),
            ..Default::default()
        };
        let bytes = field.encode_to_vec();
        let decoded: ProtoFlattenedSerializerFieldT = decode("field", &bytes).unwrap();
        assert_eq!(decoded.field_serializer_name_sym, Some(0));
        assert_eq!(decoded.var_encoder_sym, None);
    }
}
