//! The parser: extractor, orchestrator and dispatcher wired together.

use std::io::{ErrorKind as IoErrorKind, Read};

use tracing::{debug, warn};
use wire::{Chain, DemoSource, PacketExtractor, Stage};

use crate::config::PipelineConfig;
use crate::demo::Demo;
use crate::dispatcher::Dispatcher;
use crate::error::{ParserError, ParserResult};
use crate::intercept::{Interceptor, InterceptorId};
use crate::orchestrator::Orchestrator;
use crate::packet::DecodedPacket;
use crate::stats::{MemoryStats, PacketStats, ParserStats, PerformanceStats};

type Pipeline = Chain<PacketExtractor, Orchestrator>;

/// Decodes a demo stream and applies it to a [`Demo`].
///
/// A parser handles one stream at a time: [`Parser::parse`] for a complete
/// reader, or [`begin`](Parser::begin) / [`feed`](Parser::feed) /
/// [`finish`](Parser::finish) for chunks arriving live. The demo state and
/// interceptors persist across streams.
///
/// ```no_run
/// use pipeline::{Interceptor, Parser, PipelineConfig};
/// use wire::DemoSource;
///
/// let mut parser = Parser::new(PipelineConfig::default())?;
/// parser.register_post_interceptor(Interceptor::entity_packet(|event, _demo| {
///     println!("{:?} {}", event.op, event.handle.index());
/// }));
/// let file = std::fs::File::open("match.dem")?;
/// parser.parse(file, DemoSource::Replay)?;
/// println!("{:?}", parser.stats().packets);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Parser {
    config: PipelineConfig,
    pipeline: Option<Pipeline>,
    dispatcher: Dispatcher,
    packets: PacketStats,
    /// Dispatch timing, kept across streams.
    dispatch: PerformanceStats,
    /// Pipeline counters of the last finished stream.
    finished: PerformanceStats,
    /// Raw packets seen before the current stream.
    raw_base: u64,
    baselines: usize,
    sequencer_peak: usize,
    header_checked: bool,
}

impl Parser {
    pub fn new(config: PipelineConfig) -> ParserResult<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.codec_limits.clone());
        Ok(Self {
            config,
            pipeline: None,
            dispatcher,
            packets: PacketStats::default(),
            dispatch: PerformanceStats::default(),
            finished: PerformanceStats::default(),
            raw_base: 0,
            baselines: 0,
            sequencer_peak: 0,
            header_checked: false,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// `true` between [`begin`](Self::begin) and [`finish`](Self::finish).
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Starts a stream, spawning workers if configured.
    pub fn begin(&mut self, source: DemoSource) -> ParserResult<()> {
        if self.pipeline.is_some() {
            return Err(ParserError::invariant("stream already in progress"));
        }
        let extractor = PacketExtractor::new(source, self.config.wire_limits.clone());
        let orchestrator = Orchestrator::new(&self.config)?;
        self.pipeline = Some(extractor.chain(orchestrator));
        self.raw_base = self.packets.raw_packets;
        self.header_checked = source != DemoSource::Replay;
        debug!(?source, workers = self.config.worker_threads, "stream started");
        Ok(())
    }

    /// Feeds one chunk of the stream, then [`poll`](Self::poll)s.
    ///
    /// On error the stream is torn down; workers are joined before this
    /// returns.
    pub fn feed(&mut self, chunk: &[u8]) -> ParserResult<()> {
        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or_else(|| ParserError::invariant("feed without an open stream"))?;
        let result = pipeline.process(chunk);
        self.after_step(result)?;
        self.poll()
    }

    /// Dispatches a batch that has waited past `batch_wait` and applies the
    /// worker results that are ready, without blocking.
    ///
    /// A live source calls this while it waits for the next chunk, so heavy
    /// packets are not held until more input arrives.
    pub fn poll(&mut self) -> ParserResult<()> {
        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or_else(|| ParserError::invariant("poll without an open stream"))?;
        let result = pipeline.second_mut().poll();
        self.after_step(result)
    }

    /// Ends the stream: flushes batches, waits for every worker, and applies
    /// the remaining packets.
    pub fn finish(&mut self) -> ParserResult<()> {
        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or_else(|| ParserError::invariant("finish without an open stream"))?;
        let dropped = pipeline.first_mut().finish();
        if dropped > 0 {
            self.packets.framing_warnings += 1;
            self.packets.truncated_bytes += dropped as u64;
        }
        let result = pipeline.finalize();
        self.after_step(result)?;
        self.close();
        debug!(
            packets = self.packets.raw_packets,
            entities = self.dispatcher.demo().entities().len(),
            "stream finished"
        );
        Ok(())
    }

    /// Parses a complete stream from `reader`.
    pub fn parse(&mut self, mut reader: impl Read, source: DemoSource) -> ParserResult<()> {
        self.begin(source)?;
        let mut buf = vec![0; self.config.read_chunk_bytes];
        loop {
            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == IoErrorKind::Interrupted => continue,
                Err(err) => {
                    self.close();
                    return Err(err.into());
                }
            };
            self.feed(&buf[..read])?;
        }
        self.finish()
    }

    fn after_step(&mut self, result: ParserResult<Vec<DecodedPacket>>) -> ParserResult<()> {
        let result = result.and_then(|packets| self.deliver(&packets));
        if let Err(err) = result {
            warn!(error = %err, kind = %err.kind(), "stream aborted");
            self.close();
            return Err(err);
        }
        if let Some(pipeline) = &self.pipeline {
            let extractor = pipeline.first();
            self.packets.raw_packets = self.raw_base + extractor.next_sequence();
            if !self.header_checked {
                if let Some(header) = extractor.header() {
                    self.header_checked = true;
                    if !header.has_valid_magic() {
                        self.packets.framing_warnings += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn deliver(&mut self, packets: &[DecodedPacket]) -> ParserResult<()> {
        if packets.is_empty() {
            return Ok(());
        }
        self.dispatch.start("dispatch")?;
        let result = packets
            .iter()
            .try_for_each(|packet| self.dispatcher.dispatch(packet, &mut self.packets));
        self.dispatch.stop("dispatch")?;
        result
    }

    /// Drops the pipeline, keeping its counters.
    fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let (extractor, orchestrator) = pipeline.into_parts();
            self.packets.raw_packets = self.raw_base + extractor.next_sequence();
            self.baselines = orchestrator.baselines();
            self.sequencer_peak = self.sequencer_peak.max(orchestrator.sequencer_peak());
            self.finished = orchestrator.stats().clone();
        }
    }

    #[must_use]
    pub fn stats(&self) -> ParserStats {
        let demo = self.dispatcher.demo();
        let (mut performance, baselines, peak) = match &self.pipeline {
            Some(pipeline) => {
                let orchestrator = pipeline.second();
                (
                    orchestrator.stats().clone(),
                    orchestrator.baselines(),
                    orchestrator.sequencer_peak(),
                )
            }
            None => (self.finished.clone(), self.baselines, self.sequencer_peak),
        };
        performance.timings.extend(self.dispatch.timings.clone());
        ParserStats {
            packets: self.packets.clone(),
            memory: MemoryStats {
                entities: demo.entities().len(),
                active_entities: demo.entities().active_count(),
                interned_field_paths: schema::interned_count(),
                string_tables: demo.string_tables().len(),
                string_table_entries: demo.string_tables().iter().map(|t| t.len()).sum(),
                baseline_history: baselines,
                sequencer_peak: peak,
            },
            performance,
        }
    }

    #[must_use]
    pub const fn demo(&self) -> &Demo {
        self.dispatcher.demo()
    }

    pub fn demo_mut(&mut self) -> &mut Demo {
        self.dispatcher.demo_mut()
    }

    /// Adds a hook that runs before its item is applied.
    pub fn register_pre_interceptor(&mut self, interceptor: Interceptor) -> InterceptorId {
        self.dispatcher.register_pre(interceptor)
    }

    /// Adds a hook that runs after its item is applied.
    pub fn register_post_interceptor(&mut self, interceptor: Interceptor) -> InterceptorId {
        self.dispatcher.register_post(interceptor)
    }

    /// Returns `false` if `id` was not a registered pre hook.
    pub fn unregister_pre_interceptor(&mut self, id: InterceptorId) -> bool {
        self.dispatcher.unregister_pre(id)
    }

    /// Returns `false` if `id` was not a registered post hook.
    pub fn unregister_post_interceptor(&mut self, id: InterceptorId) -> bool {
        self.dispatcher.unregister_post(id)
    }
}
