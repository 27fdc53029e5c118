//! String tables, entity delta decoding and the entity store.
//!
//! This crate ties together bitstream, wire and schema to turn
//! `PacketEntities` and string-table messages into entity state.
//!
//! # Features
//!
//! - String tables with key history, per-entry compression and snapshots
//! - Entity delta decoding against cached instance baselines
//! - An authoritative entity store with handle resolution
//! - Partition baseline history for handing work to other decoders
//!
//! # Design Principles
//!
//! - **Decode apart, apply in order** - An [`EntityDecoder`] only emits
//!   [`EntityDelta`]s; the [`EntityStore`] is the single place state changes.
//! - **Bounded** - Entity counts, path depth and table sizes are checked
//!   against [`CodecLimits`].
//! - **Lazy names** - Property names are resolved only for paths that changed.

mod baseline;
mod delta;
mod entity;
mod error;
mod limits;
mod store;
mod string_table;
mod types;

pub use baseline::BaselineHistory;
pub use delta::{EntityDecoder, SERIAL_BITS};
pub use entity::{Entity, EntityDelta, EntityMutation, EntityOp};
pub use error::{CodecError, CodecResult, LimitKind};
pub use limits::CodecLimits;
pub use store::{EntityEvent, EntityStore};
pub use string_table::{StringTable, StringTableEntry, StringTables, INSTANCE_BASELINE_TABLE};
pub use types::{EntityHandle, PartitionId, INDEX_BITS};
