//! Messages exchanged between the orchestrator and decode workers.
//!
//! Both directions are closed enums; a worker handles every request kind and
//! the orchestrator every response kind, so there is no runtime lookup of
//! message types. Raw packet batches and schema protos are shared through
//! `Arc` rather than copied per worker.

use std::sync::Arc;

use codec::{EntityDelta, EntityMutation, EntityOp};
use schema::{FieldPath, FieldValue, SchemaResult};
use wire::proto::{CDemoClassInfo, CDemoSendTables, CDemoStringTables};
use wire::RawPacket;

use crate::error::ParserError;
use crate::packet::DecodedPacket;

/// Position of a batch or light packet in delivery order.
pub type Slot = u64;

/// Schema state every worker must mirror.
#[derive(Debug, Clone)]
pub enum SchemaUpdate {
    SendTables(Arc<CDemoSendTables>),
    ClassInfo(Arc<CDemoClassInfo>),
}

/// Orchestrator to worker.
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    /// Rebuild serializers or classes.
    Schema(SchemaUpdate),
    /// Baselines the worker missed, oldest first; sent before its first
    /// batch of a newly assigned partition.
    Resync { baselines: Vec<Arc<CDemoStringTables>> },
    /// Decode a batch. Only a reporting worker returns the packets; the
    /// rest decode to keep their replica current and acknowledge.
    Decode {
        slot: Slot,
        report: bool,
        packets: Arc<[RawPacket]>,
    },
}

/// Worker to orchestrator.
#[derive(Debug)]
pub enum WorkerResponse {
    Decoded {
        worker: usize,
        slot: Slot,
        packets: Vec<DecodedPacket>,
    },
    Ack {
        worker: usize,
        slot: Slot,
    },
    Failed {
        worker: usize,
        slot: Option<Slot>,
        error: ParserError,
    },
}

impl WorkerResponse {
    #[must_use]
    pub const fn worker(&self) -> usize {
        match self {
            Self::Decoded { worker, .. } | Self::Ack { worker, .. } | Self::Failed { worker, .. } => {
                *worker
            }
        }
    }

    /// `true` if this response completes a `Decode` request.
    #[must_use]
    pub const fn completes_batch(&self) -> bool {
        matches!(
            self,
            Self::Decoded { .. } | Self::Ack { .. } | Self::Failed { slot: Some(_), .. }
        )
    }
}

/// An [`EntityDelta`] with its field paths replaced by transfer codes.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedDelta {
    pub op: EntityOp,
    pub index: u32,
    pub serial: u32,
    pub class_id: i32,
    pub paths: Vec<u32>,
    pub values: Vec<FieldValue>,
}

impl PackedDelta {
    #[must_use]
    pub fn pack(delta: EntityDelta) -> Self {
        let (paths, values) = delta
            .mutations
            .into_iter()
            .map(|m| (m.path.transfer_code(), m.value))
            .unzip();
        Self {
            op: delta.op,
            index: delta.index,
            serial: delta.serial,
            class_id: delta.class_id,
            paths,
            values,
        }
    }

    /// Restores interned paths.
    pub fn unpack(&self) -> SchemaResult<EntityDelta> {
        let mutations = self
            .paths
            .iter()
            .zip(&self.values)
            .map(|(&code, value)| {
                Ok(EntityMutation {
                    path: FieldPath::from_transfer_code(code)?,
                    value: value.clone(),
                })
            })
            .collect::<SchemaResult<Vec<_>>>()?;
        Ok(EntityDelta {
            op: self.op,
            index: self.index,
            serial: self.serial,
            class_id: self.class_id,
            mutations,
        })
    }
}
