//! Routes raw packets to inline or worker decoding and restores their order.
//!
//! Light packets are decoded on the calling thread. Heavy packets are
//! batched and sent to workers; each full packet starts a new partition,
//! and every batch of a partition goes to the same worker. Every light
//! packet and every batch takes the next slot, and the sequencer releases
//! results in slot order, so output order equals input order regardless of
//! which worker finishes first.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use codec::{BaselineHistory, PartitionId};
use tracing::{debug, trace, warn};
use wire::proto::{self, CDemoFullPacket, CDemoStringTables};
use wire::{DemoCommand, RawPacket, Stage};

use crate::balancer::Balancer;
use crate::batcher::Batcher;
use crate::config::{ConfigError, PipelineConfig};
use crate::error::{ParserError, ParserResult};
use crate::packet::{decode_light, DecodedPacket, DemoPacket};
use crate::pool::WorkerPool;
use crate::protocol::{SchemaUpdate, Slot, WorkerRequest, WorkerResponse};
use crate::sequencer::Sequencer;
use crate::stats::PerformanceStats;
use crate::worker::Replica;

/// How long a blocked wait lasts before re-checking worker liveness.
const WAIT_SLICE: Duration = Duration::from_millis(50);

type Pending = Sequencer<Vec<DecodedPacket>>;

/// Worker threads plus their partition bookkeeping.
#[derive(Debug)]
struct Workers {
    pool: WorkerPool,
    balancer: Balancer,
}

impl Workers {
    fn handle(&mut self, response: WorkerResponse, pending: &mut Pending) -> ParserResult<()> {
        if response.completes_batch() {
            self.balancer.completed(response.worker())?;
        }
        match response {
            WorkerResponse::Decoded {
                worker,
                slot,
                packets,
            } => {
                trace!(worker, slot, packets = packets.len(), "batch decoded");
                pending.push(slot, packets)
            }
            WorkerResponse::Ack { worker, slot } => {
                trace!(worker, slot, "batch acknowledged");
                Ok(())
            }
            WorkerResponse::Failed { worker, slot, error } => {
                warn!(worker, ?slot, error = %error, "worker failed");
                Err(error)
            }
        }
    }

    /// Handles every response already queued.
    fn drain(&mut self, pending: &mut Pending) -> ParserResult<()> {
        while let Some(response) = self.pool.try_recv()? {
            self.handle(response, pending)?;
        }
        Ok(())
    }

    /// Blocks until one response arrives or the wait slice ends.
    fn wait(&mut self, pending: &mut Pending) -> ParserResult<()> {
        if let Some(response) = self.pool.recv_timeout(WAIT_SLICE)? {
            self.handle(response, pending)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Mode {
    Inline(Box<Replica>),
    Pooled(Workers),
}

/// Pipeline stage from raw packets to ordered decoded packets.
#[derive(Debug)]
pub struct Orchestrator {
    mode: Mode,
    batcher: Batcher,
    pending: Pending,
    next_slot: Slot,
    partition: PartitionId,
    history: BaselineHistory<Arc<CDemoStringTables>>,
    stats: PerformanceStats,
    yield_interval: usize,
    since_poll: usize,
}

impl Orchestrator {
    /// Starts the worker threads, if any.
    pub fn new(config: &PipelineConfig) -> ParserResult<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.baseline_history).ok_or(ConfigError::Zero {
            field: "baseline_history",
        })?;
        let mode = if config.is_inline() {
            Mode::Inline(Box::new(Replica::new(
                config.wire_limits.clone(),
                config.codec_limits.clone(),
            )))
        } else {
            Mode::Pooled(Workers {
                pool: WorkerPool::spawn(
                    config.worker_threads,
                    config.channel_capacity,
                    &config.wire_limits,
                    &config.codec_limits,
                )?,
                balancer: Balancer::new(config.worker_threads),
            })
        };
        Ok(Self {
            mode,
            batcher: Batcher::new(config.batch_bytes, config.batch_wait),
            pending: Sequencer::new(),
            next_slot: 0,
            partition: PartitionId::SIGNON,
            history: BaselineHistory::new(capacity),
            stats: PerformanceStats {
                worker_batches: vec![0; config.worker_threads],
                ..PerformanceStats::default()
            },
            yield_interval: config.yield_interval,
            since_poll: 0,
        })
    }

    /// Partition the next heavy packet belongs to.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    #[must_use]
    pub const fn stats(&self) -> &PerformanceStats {
        &self.stats
    }

    /// Baselines currently kept for resynchronization.
    #[must_use]
    pub fn baselines(&self) -> usize {
        self.history.len()
    }

    /// Most results ever held waiting for an earlier slot.
    #[must_use]
    pub const fn sequencer_peak(&self) -> usize {
        self.pending.peak()
    }

    /// Batches sent to workers and not yet answered.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        match &self.mode {
            Mode::Inline(_) => 0,
            Mode::Pooled(workers) => workers.balancer.outstanding(),
        }
    }

    fn allocate(&mut self) -> Slot {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn ready(&mut self) -> Vec<DecodedPacket> {
        self.pending.drain_ready().into_iter().flatten().collect()
    }

    /// Dispatches whatever the batcher holds.
    fn flush(&mut self) -> ParserResult<()> {
        match self.batcher.take() {
            Some(batch) => self.dispatch(batch),
            None => Ok(()),
        }
    }

    /// Runs the time-based work between packets: dispatches a batch older
    /// than `batch_wait` and collects finished worker results, without
    /// blocking. Returns what the sequencer can release.
    pub fn poll(&mut self) -> ParserResult<Vec<DecodedPacket>> {
        self.since_poll = 0;
        self.collect()?;
        Ok(self.ready())
    }

    fn collect(&mut self) -> ParserResult<()> {
        if let Some(batch) = self.batcher.poll(Instant::now()) {
            self.dispatch(batch)?;
        }
        if let Mode::Pooled(workers) = &mut self.mode {
            workers.drain(&mut self.pending)?;
        }
        Ok(())
    }

    fn open_partition(&mut self, raw: &RawPacket) -> ParserResult<()> {
        self.partition = self.partition.next();
        self.stats.partitions += 1;
        if let Mode::Pooled(workers) = &mut self.mode {
            match full_packet_baseline(raw) {
                Some(baseline) => self.history.insert(self.partition, Arc::new(baseline))?,
                None => debug!(partition = %self.partition, "full packet without baseline"),
            }
            workers.balancer.open_partition(self.partition)?;
        }
        debug!(partition = %self.partition, sequence = raw.sequence, "partition opened");
        Ok(())
    }

    /// Mirrors schema packets into every decoding replica.
    fn mirror_schema(&mut self, packet: &DecodedPacket) -> ParserResult<()> {
        let update = match &packet.packet {
            DemoPacket::SendTables(tables) => SchemaUpdate::SendTables(Arc::clone(tables)),
            DemoPacket::ClassInfo(info) => SchemaUpdate::ClassInfo(Arc::clone(info)),
            _ => return Ok(()),
        };
        match &mut self.mode {
            Mode::Inline(replica) => replica.apply_schema(&update),
            Mode::Pooled(workers) => workers.pool.broadcast(&WorkerRequest::Schema(update)),
        }
    }

    fn dispatch(&mut self, batch: Vec<RawPacket>) -> ParserResult<()> {
        let slot = self.allocate();
        self.stats.batches += 1;
        let partition = self.partition;
        match &mut self.mode {
            Mode::Inline(replica) => {
                self.stats.start("inline_decode")?;
                let decoded = replica.decode_batch(&batch)?;
                self.stats.stop("inline_decode")?;
                self.stats.inline_batches += 1;
                self.pending.push(slot, decoded)
            }
            Mode::Pooled(workers) => {
                let packets: Arc<[RawPacket]> = batch.into();
                if partition.is_signon() {
                    for worker in 0..workers.pool.len() {
                        workers.pool.send(
                            worker,
                            WorkerRequest::Decode {
                                slot,
                                report: worker == 0,
                                packets: Arc::clone(&packets),
                            },
                        )?;
                        workers.balancer.sent(worker);
                    }
                    self.stats.broadcast_batches += 1;
                    self.stats.credit_worker(0);
                    trace!(slot, packets = packets.len(), "signon batch broadcast");
                    return Ok(());
                }

                let assignment = loop {
                    if let Some(assignment) = workers.balancer.assign(partition)? {
                        break assignment;
                    }
                    self.stats.start("wait_for_worker")?;
                    workers.wait(&mut self.pending)?;
                    self.stats.stop("wait_for_worker")?;
                };
                let worker = assignment.worker;
                if assignment.fresh {
                    let baselines: Vec<_> = self
                        .history
                        .between(assignment.last_known, partition)
                        .map(|(_, baseline)| Arc::clone(baseline))
                        .collect();
                    debug!(worker, %partition, baselines = baselines.len(), "worker resync");
                    workers.pool.send(worker, WorkerRequest::Resync { baselines })?;
                    self.stats.resyncs += 1;
                }
                trace!(worker, slot, packets = packets.len(), "batch sent");
                workers.pool.send(
                    worker,
                    WorkerRequest::Decode {
                        slot,
                        report: true,
                        packets,
                    },
                )?;
                workers.balancer.sent(worker);
                self.stats.credit_worker(worker);
                Ok(())
            }
        }
    }
}

/// The string-table snapshot of a full packet, if it can be read.
fn full_packet_baseline(raw: &RawPacket) -> Option<CDemoStringTables> {
    let payload = raw.decompressed().ok()?;
    proto::decode::<CDemoFullPacket>("CDemoFullPacket", &payload)
        .ok()?
        .string_table
}

impl Stage<RawPacket> for Orchestrator {
    type Output = DecodedPacket;
    type Error = ParserError;

    fn process(&mut self, raw: RawPacket) -> ParserResult<Vec<DecodedPacket>> {
        let command = raw.command();
        if command == DemoCommand::FullPacket {
            self.flush()?;
            self.open_partition(&raw)?;
        }
        if command.is_heavy() {
            if let Some(batch) = self.batcher.push(raw, Instant::now()) {
                self.dispatch(batch)?;
            }
        } else {
            self.flush()?;
            let decoded = decode_light(&raw);
            self.mirror_schema(&decoded)?;
            let slot = self.allocate();
            self.pending.push(slot, vec![decoded])?;
        }

        self.since_poll += 1;
        if self.since_poll >= self.yield_interval {
            self.since_poll = 0;
            self.collect()?;
        }
        Ok(self.ready())
    }

    fn finalize(&mut self) -> ParserResult<Vec<DecodedPacket>> {
        self.flush()?;
        if let Mode::Pooled(workers) = &mut self.mode {
            workers.balancer.close_all()?;
            while workers.balancer.outstanding() > 0 {
                workers.wait(&mut self.pending)?;
            }
        }
        let out = self.ready();
        if !self.pending.is_empty() || self.pending.next_expected() != self.next_slot {
            return Err(ParserError::invariant(format!(
                "stream ended with {} results held and slot {} of {} released",
                self.pending.held(),
                self.pending.next_expected(),
                self.next_slot
            )));
        }
        if let Mode::Pooled(workers) = &mut self.mode {
            workers.pool.shutdown();
        }
        debug!(slots = self.next_slot, partitions = self.stats.partitions, "pipeline drained");
        Ok(out)
    }
}
