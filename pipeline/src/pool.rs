//! Decode worker threads and their channels.
//!
//! Each worker has its own bounded request channel so that a partition's
//! batches reach exactly one replica in order. All workers share one
//! unbounded response channel: the orchestrator never blocks a worker that
//! is trying to answer, and a full request channel can only mean the
//! orchestrator is ahead.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use codec::CodecLimits;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};
use wire::Limits;

use crate::error::{ParserError, ParserResult};
use crate::protocol::{WorkerRequest, WorkerResponse};
use crate::worker;

struct Handle {
    requests: Option<Sender<WorkerRequest>>,
    thread: Option<JoinHandle<()>>,
}

/// A fixed set of decode workers.
pub struct WorkerPool {
    workers: Vec<Handle>,
    responses: Receiver<WorkerResponse>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("pending_responses", &self.responses.len())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `count` workers named `s2demo-worker-{i}`.
    pub fn spawn(
        count: usize,
        capacity: usize,
        wire_limits: &Limits,
        codec_limits: &CodecLimits,
    ) -> ParserResult<Self> {
        let (response_tx, responses) = crossbeam_channel::unbounded();
        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let (request_tx, request_rx) = crossbeam_channel::bounded(capacity);
            let response_tx = response_tx.clone();
            let wire_limits = wire_limits.clone();
            let codec_limits = codec_limits.clone();
            let thread = thread::Builder::new()
                .name(format!("s2demo-worker-{id}"))
                .spawn(move || worker::run(id, request_rx, response_tx, wire_limits, codec_limits))?;
            workers.push(Handle {
                requests: Some(request_tx),
                thread: Some(thread),
            });
        }
        debug!(workers = count, capacity, "worker pool started");
        Ok(Self { workers, responses })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Sends a request to one worker, blocking while its queue is full.
    pub fn send(&self, worker: usize, request: WorkerRequest) -> ParserResult<()> {
        let sender = self
            .workers
            .get(worker)
            .and_then(|w| w.requests.as_ref())
            .ok_or(ParserError::WorkerLost { worker })?;
        sender
            .send(request)
            .map_err(|_| ParserError::WorkerLost { worker })
    }

    /// Sends a copy of `request` to every worker.
    pub fn broadcast(&self, request: &WorkerRequest) -> ParserResult<()> {
        for worker in 0..self.workers.len() {
            self.send(worker, request.clone())?;
        }
        Ok(())
    }

    pub fn try_recv(&self) -> ParserResult<Option<WorkerResponse>> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.lost()),
        }
    }

    /// Waits up to `timeout` for a response.
    ///
    /// A timeout is also a liveness check: a worker that has exited while
    /// the pool still holds its sender has died.
    pub fn recv_timeout(&self, timeout: Duration) -> ParserResult<Option<WorkerResponse>> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => {
                self.check_alive()?;
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.lost()),
        }
    }

    /// Fails if any worker thread has stopped.
    pub fn check_alive(&self) -> ParserResult<()> {
        match self.dead() {
            Some(worker) => Err(ParserError::WorkerLost { worker }),
            None => Ok(()),
        }
    }

    fn dead(&self) -> Option<usize> {
        self.workers
            .iter()
            .position(|w| w.thread.as_ref().map_or(true, JoinHandle::is_finished))
    }

    fn lost(&self) -> ParserError {
        ParserError::WorkerLost {
            worker: self.dead().unwrap_or(0),
        }
    }

    /// Closes every request channel and joins the threads. Returns the
    /// number of workers that exited cleanly.
    pub fn shutdown(&mut self) -> usize {
        for worker in &mut self.workers {
            worker.requests = None;
        }
        let mut joined = 0;
        for (id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take() {
                match thread.join() {
                    Ok(()) => joined += 1,
                    Err(_) => warn!(worker = id, "worker panicked"),
                }
            }
        }
        debug!(joined, "worker pool stopped");
        joined
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.workers.iter().any(|w| w.thread.is_some()) {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wire::RawPacket;

    fn pool(count: usize) -> WorkerPool {
        WorkerPool::spawn(count, 2, &Limits::for_testing(), &CodecLimits::for_testing()).unwrap()
    }

    fn empty_batch(slot: u64, report: bool) -> WorkerRequest {
        let packets: Arc<[RawPacket]> = Vec::new().into();
        WorkerRequest::Decode {
            slot,
            report,
            packets,
        }
    }

    #[test]
    fn broadcast_reaches_every_worker() {
        let mut pool = pool(3);
        pool.broadcast(&empty_batch(0, false)).unwrap();
        let mut workers = Vec::new();
        while workers.len() < 3 {
            if let Some(response) = pool.recv_timeout(Duration::from_secs(5)).unwrap() {
                workers.push(response.worker());
            }
        }
        workers.sort_unstable();
        assert_eq!(workers, [0, 1, 2]);
        assert_eq!(pool.shutdown(), 3);
    }

    #[test]
    fn send_to_unknown_worker_fails() {
        let pool = pool(1);
        let err = pool.send(4, empty_batch(0, true)).unwrap_err();
        assert!(matches!(err, ParserError::WorkerLost { worker: 4 }));
    }

    #[test]
    fn try_recv_is_empty_when_idle() {
        let pool = pool(1);
        assert!(pool.try_recv().unwrap().is_none());
        pool.check_alive().unwrap();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut pool = pool(2);
        assert_eq!(pool.shutdown(), 2);
        assert_eq!(pool.shutdown(), 0);
        assert!(pool.send(0, empty_batch(0, true)).is_err());
    }
}
