//! Field paths, serializers and field decoders for Source 2 entity state.
//!
//! This crate covers everything between a bit reader and a decoded property:
//! - Huffman-coded field-path operations and the paths they produce
//! - Serializer and class registries built from the demo's send tables
//! - Field decoders chosen per field from its var type and encoding properties
//!
//! # Design Principles
//!
//! - **Interned paths** - A [`FieldPath`] is a `Copy` handle; equal paths are the same handle.
//! - **Decide once** - Decoders are picked when serializers are built, not per value.
//! - **Thread-local schemas** - Registries use `Rc` and are rebuilt per worker from shared messages.

mod class;
mod decoder;
mod error;
mod field_path;
mod huffman;
mod path_decoder;
mod registry;
mod serializer;
mod value;
mod var_type;

pub use class::{ClassInfo, ClassRegistry};
pub use decoder::{FieldDecoder, FieldProps, FloatDecoder, QuantizedFloat, MAX_STRING_BYTES};
pub use error::{SchemaError, SchemaResult};
pub use field_path::{interned_count, FieldPath, MAX_FIELD_PATH_DEPTH};
pub use huffman::{table as huffman_table, Code, FieldOp, HuffmanTable, MAX_CODE_BITS, OP_COUNT};
pub use path_decoder::{decode_field_paths, write_op, FieldPathDecoder, FieldPathEncoder};
pub use registry::SerializerRegistry;
pub use serializer::{Field, FieldKind, FieldModel, Serializer};
pub use value::FieldValue;
pub use var_type::VarType;
