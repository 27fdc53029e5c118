//! Pipeline configuration and validation.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use codec::CodecLimits;
use wire::Limits;

/// Upper bound on decode worker threads.
pub const MAX_WORKER_THREADS: usize = 64;

/// Tuning for the decode pipeline.
///
/// `worker_threads == 0` decodes everything inline on the calling thread.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Number of decode worker threads.
    pub worker_threads: usize,
    /// A batch is dispatched once its payloads reach this many bytes.
    pub batch_bytes: usize,
    /// A non-empty batch is dispatched once it has waited this long.
    pub batch_wait: Duration,
    /// Raw packets processed between polls of the worker result queue.
    pub yield_interval: usize,
    /// Read size used by [`Parser::parse`](crate::Parser::parse).
    pub read_chunk_bytes: usize,
    /// Capacity of each worker's request queue.
    pub channel_capacity: usize,
    /// Number of full-packet baselines kept for worker resynchronization.
    pub baseline_history: usize,
    pub wire_limits: Limits,
    pub codec_limits: CodecLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let worker_threads = std::thread::available_parallelism()
            .map_or(1, |n| n.get().saturating_sub(1))
            .clamp(1, 8);
        Self {
            worker_threads,
            batch_bytes: 256 * 1024,
            batch_wait: Duration::from_millis(20),
            yield_interval: 256,
            read_chunk_bytes: 64 * 1024,
            channel_capacity: 64,
            baseline_history: 32,
            wire_limits: Limits::default(),
            codec_limits: CodecLimits::default(),
        }
    }
}

impl PipelineConfig {
    /// Decodes everything on the calling thread.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            worker_threads: 0,
            ..Self::default()
        }
    }

    /// Two workers and tiny batches so tests cross partition and batch
    /// boundaries with little input.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            worker_threads: 2,
            batch_bytes: 64,
            batch_wait: Duration::from_secs(60),
            yield_interval: 4,
            read_chunk_bytes: 7,
            channel_capacity: 4,
            baseline_history: 8,
            wire_limits: Limits::for_testing(),
            codec_limits: CodecLimits::for_testing(),
        }
    }

    /// Returns `true` if no worker threads are used.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        self.worker_threads == 0
    }

    /// Checks structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads > MAX_WORKER_THREADS {
            return Err(ConfigError::TooManyWorkers {
                configured: self.worker_threads,
                max: MAX_WORKER_THREADS,
            });
        }
        let non_zero = [
            ("batch_bytes", self.batch_bytes),
            ("yield_interval", self.yield_interval),
            ("read_chunk_bytes", self.read_chunk_bytes),
            ("channel_capacity", self.channel_capacity),
            ("baseline_history", self.baseline_history),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }
}

/// A rejected [`PipelineConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// More worker threads than the pipeline supports.
    TooManyWorkers { configured: usize, max: usize },
    /// A size or count that must be at least 1 was 0.
    Zero { field: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyWorkers { configured, max } => {
                write!(f, "worker_threads {configured} exceeds maximum of {max}")
            }
            Self::Zero { field } => write!(f, "{field} must be at least 1"),
        }
    }
}

impl Error for ConfigError {}
