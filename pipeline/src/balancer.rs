//! Partition-to-worker affinity.
//!
//! Partition 0 (signon) goes to every worker. Every later partition sticks to
//! the one worker that took its first batch, so that worker's replica sees
//! the partition's packets in order. A worker returns to the idle pool once
//! its partition is closed and all of its batches have completed.

use std::collections::VecDeque;

use codec::PartitionId;
use tracing::debug;

use crate::error::{ParserError, ParserResult};

/// Counting gate over the idle workers.
///
/// At most `capacity` partitions are in flight; acquiring fails until a
/// permit is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    permits: usize,
    capacity: usize,
}

impl Gate {
    /// A gate with every permit taken.
    #[must_use]
    pub const fn exhausted(capacity: usize) -> Self {
        Self {
            permits: 0,
            capacity,
        }
    }

    #[must_use]
    pub const fn available(&self) -> usize {
        self.permits
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn try_acquire(&mut self) -> bool {
        if self.permits == 0 {
            return false;
        }
        self.permits -= 1;
        true
    }

    pub fn release(&mut self) -> ParserResult<()> {
        if self.permits == self.capacity {
            return Err(ParserError::invariant("gate released more permits than it holds"));
        }
        self.permits += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct WorkerState {
    partition: Option<PartitionId>,
    outstanding: usize,
    last_known: Option<PartitionId>,
}

/// A worker chosen for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub worker: usize,
    /// The worker just took this partition and needs the baselines since
    /// `last_known`.
    pub fresh: bool,
    pub last_known: Option<PartitionId>,
}

/// Tracks which worker owns which partition.
#[derive(Debug)]
pub struct Balancer {
    workers: Vec<WorkerState>,
    idle: VecDeque<usize>,
    gate: Gate,
    /// Every partition below this one is closed.
    open: PartitionId,
}

impl Balancer {
    /// All workers start on partition 0.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let state = WorkerState {
            partition: Some(PartitionId::SIGNON),
            ..WorkerState::default()
        };
        Self {
            workers: vec![state; workers],
            idle: VecDeque::new(),
            gate: Gate::exhausted(workers),
            open: PartitionId::SIGNON,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    #[must_use]
    pub fn idle(&self) -> usize {
        self.gate.available()
    }

    /// Batches sent but not yet answered, across all workers.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.workers.iter().map(|w| w.outstanding).sum()
    }

    /// Workers with unanswered batches.
    pub fn busy(&self) -> impl Iterator<Item = usize> + '_ {
        self.workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.outstanding > 0)
            .map(|(id, _)| id)
    }

    /// Finds the worker for the next batch of `partition`.
    ///
    /// `None` means every worker is held by another partition; the caller
    /// waits for a completion and retries.
    pub fn assign(&mut self, partition: PartitionId) -> ParserResult<Option<Assignment>> {
        if partition < self.open {
            return Err(ParserError::invariant(format!(
                "batch for closed partition {partition}"
            )));
        }
        if let Some(worker) = self.workers.iter().position(|w| w.partition == Some(partition)) {
            return Ok(Some(Assignment {
                worker,
                fresh: false,
                last_known: self.workers[worker].last_known,
            }));
        }
        if !self.gate.try_acquire() {
            return Ok(None);
        }
        let worker = self
            .idle
            .pop_front()
            .ok_or_else(|| ParserError::invariant("gate permit without an idle worker"))?;
        let state = &mut self.workers[worker];
        let last_known = state.last_known;
        state.partition = Some(partition);
        state.last_known = Some(partition);
        debug!(worker, %partition, "partition assigned");
        Ok(Some(Assignment {
            worker,
            fresh: true,
            last_known,
        }))
    }

    /// Records a batch sent to `worker`.
    pub fn sent(&mut self, worker: usize) {
        if let Some(state) = self.workers.get_mut(worker) {
            state.outstanding += 1;
        }
    }

    /// Records a completed batch and releases the worker if it is done.
    pub fn completed(&mut self, worker: usize) -> ParserResult<()> {
        let state = self
            .workers
            .get_mut(worker)
            .ok_or_else(|| ParserError::invariant(format!("response from unknown worker {worker}")))?;
        state.outstanding = state.outstanding.checked_sub(1).ok_or_else(|| {
            ParserError::invariant(format!("worker {worker} answered more batches than it was sent"))
        })?;
        self.release_finished()
    }

    /// Closes every partition before `partition`.
    pub fn open_partition(&mut self, partition: PartitionId) -> ParserResult<()> {
        if partition < self.open {
            return Err(ParserError::invariant(format!(
                "partition {partition} opened after {}",
                self.open
            )));
        }
        self.open = partition;
        self.release_finished()
    }

    /// Closes every partition; used when the stream ends.
    pub fn close_all(&mut self) -> ParserResult<()> {
        self.open = PartitionId::new(u32::MAX);
        self.release_finished()
    }

    fn release_finished(&mut self) -> ParserResult<()> {
        for (id, state) in self.workers.iter_mut().enumerate() {
            let closed = state.partition.is_some_and(|p| p < self.open);
            if closed && state.outstanding == 0 {
                debug!(worker = id, partition = ?state.partition, "worker released");
                state.partition = None;
                self.idle.push_back(id);
                self.gate.release()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u32) -> PartitionId {
        PartitionId::new(id)
    }

    #[test]
    fn gate_counts_permits() {
        let mut gate = Gate::exhausted(2);
        assert!(!gate.try_acquire());
        gate.release().unwrap();
        gate.release().unwrap();
        assert!(gate.release().is_err());
        assert!(gate.try_acquire());
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.capacity(), 2);
    }

    #[test]
    fn signon_holds_every_worker() {
        let mut balancer = Balancer::new(2);
        assert_eq!(balancer.idle(), 0);
        balancer.sent(0);
        balancer.sent(1);

        balancer.open_partition(p(1)).unwrap();
        assert_eq!(balancer.assign(p(1)).unwrap(), None);

        balancer.completed(1).unwrap();
        let a = balancer.assign(p(1)).unwrap().unwrap();
        assert_eq!(a.worker, 1);
        assert!(a.fresh);
        assert_eq!(a.last_known, None);
    }

    #[test]
    fn partitions_stick_to_their_worker() {
        let mut balancer = Balancer::new(2);
        balancer.open_partition(p(1)).unwrap();
        assert_eq!(balancer.idle(), 2);

        let first = balancer.assign(p(1)).unwrap().unwrap();
        balancer.sent(first.worker);
        let again = balancer.assign(p(1)).unwrap().unwrap();
        assert_eq!(again.worker, first.worker);
        assert!(!again.fresh);

        balancer.open_partition(p(2)).unwrap();
        let second = balancer.assign(p(2)).unwrap().unwrap();
        assert_ne!(second.worker, first.worker);
        balancer.sent(second.worker);

        // the first worker is still draining partition 1
        balancer.open_partition(p(3)).unwrap();
        assert_eq!(balancer.assign(p(3)).unwrap(), None);
        balancer.completed(first.worker).unwrap();
        assert_eq!(balancer.outstanding(), 1);
        let third = balancer.assign(p(3)).unwrap().unwrap();
        assert_eq!(third.worker, first.worker);
        assert_eq!(third.last_known, Some(p(1)));
    }

    #[test]
    fn close_all_releases_everyone() {
        let mut balancer = Balancer::new(3);
        balancer.sent(2);
        balancer.close_all().unwrap();
        assert_eq!(balancer.idle(), 2);
        assert_eq!(balancer.busy().collect::<Vec<_>>(), [2]);
        balancer.completed(2).unwrap();
        assert_eq!(balancer.idle(), 3);
    }

    #[test]
    fn rejects_stray_completions() {
        let mut balancer = Balancer::new(1);
        assert!(balancer.completed(0).is_err());
        assert!(balancer.completed(5).is_err());
    }
}
