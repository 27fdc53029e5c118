//! Concurrent decode pipeline, dispatcher and [`Parser`].
//!
//! Raw packets cut by the [`wire::PacketExtractor`] flow through an
//! [`Orchestrator`] that decodes light packets inline and sends batches of
//! heavy packets to worker threads, then through a [`Dispatcher`] that
//! applies them to the [`Demo`] and runs interceptors.
//!
//! # Features
//!
//! - Size- and age-based batching of heavy packets
//! - Partition affinity: every batch between two full packets goes to one
//!   worker, which is resynchronized from recorded baselines when it takes
//!   a new partition
//! - A min-heap sequencer restoring stream order across workers
//! - Pre and post interceptors for demo packets, messages and entity events
//! - Packet, memory and performance statistics
//!
//! # Design Principles
//!
//! - **Nothing shared** - Workers own private replicas; raw packets and
//!   schema protos are passed by `Arc`, results by value.
//! - **One writer** - Only the dispatcher mutates the [`Demo`], and only in
//!   sequence order.
//! - **Loud failures** - Framing, schema and invariant errors stop the
//!   stream; undecodable packets are counted and skipped.

mod balancer;
mod batcher;
mod config;
mod demo;
mod dispatcher;
mod error;
mod intercept;
mod orchestrator;
mod packet;
mod parser;
mod pool;
mod protocol;
mod schema_state;
mod sequencer;
mod stats;
mod worker;

pub use balancer::{Assignment, Balancer, Gate};
pub use batcher::Batcher;
pub use config::{ConfigError, PipelineConfig, MAX_WORKER_THREADS};
pub use demo::{Demo, ServerInfo};
pub use dispatcher::Dispatcher;
pub use error::{ErrorKind, ParserError, ParserResult};
pub use intercept::{InterceptStage, Interceptor, InterceptorId};
pub use orchestrator::Orchestrator;
pub use packet::{decode_light, DecodedPacket, DemoPacket, EntityPacket, Message};
pub use parser::Parser;
pub use pool::WorkerPool;
pub use protocol::{PackedDelta, SchemaUpdate, Slot, WorkerRequest, WorkerResponse};
pub use schema_state::SchemaState;
pub use sequencer::Sequencer;
pub use stats::{MemoryStats, PacketStats, ParserStats, PerformanceStats, Timing};
pub use worker::Replica;
