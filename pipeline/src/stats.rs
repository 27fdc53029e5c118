//! Parser statistics.
//!
//! Counters are updated on the orchestrating thread only; workers report
//! through their responses.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use wire::MessageKind;

use crate::error::{ParserError, ParserResult};
use crate::packet::{DecodedPacket, DemoPacket, Message};

/// Everything the parser counts.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParserStats {
    pub packets: PacketStats,
    pub memory: MemoryStats,
    pub performance: PerformanceStats,
}

/// What went through the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PacketStats {
    /// Frames cut from the byte stream.
    pub raw_packets: u64,
    /// Delivered packets by command name.
    pub commands: BTreeMap<String, u64>,
    /// Inner messages delivered.
    pub messages: u64,
    /// Entity operations applied to the store.
    pub entity_ops: u64,
    /// Messages or deltas the dispatcher could not apply.
    pub skipped: u64,
    /// Packets and messages that failed to decode.
    pub unparsed: u64,
    /// Unparsed and skipped items by packet or message name.
    pub skip_reasons: BTreeMap<String, u64>,
    pub framing_warnings: u64,
    /// Bytes left in the extractor when the stream ended.
    pub truncated_bytes: u64,
}

impl PacketStats {
    pub(crate) fn record(&mut self, packet: &DecodedPacket) {
        *self.commands.entry(packet.command.name().to_owned()).or_default() += 1;
        if matches!(packet.packet, DemoPacket::Unparsed { .. }) {
            self.unparsed += 1;
            self.tally(packet.command.name());
        }
        for message in packet.messages() {
            self.messages += 1;
            if matches!(message, Message::Unparsed { .. }) {
                self.unparsed += 1;
                self.tally(message.kind().map_or("message container", MessageKind::name));
            }
        }
    }

    pub(crate) fn skip(&mut self, name: &str) {
        self.skipped += 1;
        self.tally(name);
    }

    fn tally(&mut self, name: &str) {
        *self.skip_reasons.entry(name.to_owned()).or_default() += 1;
    }
}

/// Sizes of the state the parser holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MemoryStats {
    pub entities: usize,
    pub active_entities: usize,
    pub interned_field_paths: usize,
    pub string_tables: usize,
    pub string_table_entries: usize,
    pub baseline_history: usize,
    /// Most results ever held back waiting for an earlier batch.
    pub sequencer_peak: usize,
}

/// Where the work went.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PerformanceStats {
    pub batches: u64,
    pub inline_batches: u64,
    /// Batches each worker was the reporting decoder for.
    pub worker_batches: Vec<u64>,
    /// Batches decoded by every worker.
    pub broadcast_batches: u64,
    pub resyncs: u64,
    pub partitions: u64,
    pub timings: BTreeMap<String, Timing>,
}

impl PerformanceStats {
    pub(crate) fn credit_worker(&mut self, worker: usize) {
        if self.worker_batches.len() <= worker {
            self.worker_batches.resize(worker + 1, 0);
        }
        self.worker_batches[worker] += 1;
    }

    /// Starts the named timer.
    pub fn start(&mut self, name: &str) -> ParserResult<()> {
        self.timings.entry(name.to_owned()).or_default().start(name)
    }

    /// Stops the named timer.
    pub fn stop(&mut self, name: &str) -> ParserResult<()> {
        self.timings
            .get_mut(name)
            .ok_or_else(|| ParserError::invariant(format!("timer {name} was never started")))?
            .stop(name)
    }
}

/// Accumulated wall time of one phase.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Timing {
    pub calls: u64,
    pub total_micros: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    started: Option<Instant>,
}

impl Timing {
    fn start(&mut self, name: &str) -> ParserResult<()> {
        if self.started.is_some() {
            return Err(ParserError::invariant(format!("timer {name} started twice")));
        }
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self, name: &str) -> ParserResult<()> {
        let started = self
            .started
            .take()
            .ok_or_else(|| ParserError::invariant(format!("timer {name} stopped while idle")))?;
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.calls += 1;
        self.total_micros = self.total_micros.saturating_add(micros);
        Ok(())
    }

    #[must_use]
    pub const fn total(&self) -> Duration {
        Duration::from_micros(self.total_micros)
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::{DemoCommand, InnerMessage};

    #[test]
    fn timers_reject_nesting() {
        let mut perf = PerformanceStats::default();
        perf.start("dispatch").unwrap();
        assert!(perf.timings["dispatch"].is_running());
        let err = perf.start("dispatch").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Invariant);

        perf.stop("dispatch").unwrap();
        assert_eq!(perf.timings["dispatch"].calls, 1);
        assert!(perf.stop("dispatch").is_err());
        assert!(perf.stop("never").is_err());
    }

    #[test]
    fn worker_credit_grows() {
        let mut perf = PerformanceStats::default();
        perf.credit_worker(2);
        perf.credit_worker(2);
        assert_eq!(perf.worker_batches, [0, 0, 2]);
    }

    #[test]
    fn records_commands_and_unparsed() {
        let mut stats = PacketStats::default();
        let packet = DecodedPacket {
            sequence: 0,
            tick: 0,
            command: DemoCommand::Packet,
            packet: DemoPacket::Packet(vec![
                Message::ClearAllStringTables,
                Message::unparsed(
                    InnerMessage {
                        type_id: 4,
                        payload: vec![],
                    },
                    "bad",
                ),
            ]),
        };
        stats.record(&packet);
        stats.record(&packet);
        assert_eq!(stats.commands[DemoCommand::Packet.name()], 2);
        assert_eq!(stats.messages, 4);
        assert_eq!(stats.unparsed, 2);
        assert_eq!(stats.skip_reasons["net_Tick"], 2);

        stats.skip("svc_PacketEntities");
        assert_eq!(stats.skipped, 1);
    }
}
