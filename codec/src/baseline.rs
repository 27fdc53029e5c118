//! Partition baseline history.

use std::num::NonZeroUsize;

use crate::error::{CodecError, CodecResult};
use crate::PartitionId;

/// A fixed-capacity ring buffer of baselines keyed by partition.
///
/// The orchestrator records the string-table snapshot each full packet
/// carries here. A worker taking over a partition is sent the slice it
/// missed since the last partition it decoded.
#[derive(Debug)]
pub struct BaselineHistory<T> {
    entries: Vec<Option<Entry<T>>>,
    head: usize,
    len: usize,
    last: Option<PartitionId>,
}

#[derive(Debug)]
struct Entry<T> {
    partition: PartitionId,
    value: T,
}

impl<T> BaselineHistory<T> {
    /// Creates a new history with the given capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get();
        let mut entries = Vec::with_capacity(cap);
        entries.resize_with(cap, || None);
        Self {
            entries,
            head: 0,
            len: 0,
            last: None,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Newest recorded partition.
    #[must_use]
    pub const fn last(&self) -> Option<PartitionId> {
        self.last
    }

    /// Records the baseline that opens `partition`.
    ///
    /// Partitions must be strictly increasing. When full, the oldest entry
    /// is overwritten.
    pub fn insert(&mut self, partition: PartitionId, value: T) -> CodecResult<()> {
        if let Some(last) = self.last {
            if partition <= last {
                return Err(CodecError::BaselineOutOfOrder {
                    last: last.raw(),
                    new: partition.raw(),
                });
            }
        }

        let cap = self.entries.len();
        if self.len < cap {
            let idx = (self.head + self.len) % cap;
            self.entries[idx] = Some(Entry { partition, value });
            self.len += 1;
        } else {
            self.entries[self.head] = Some(Entry { partition, value });
            self.head = (self.head + 1) % cap;
        }

        self.last = Some(partition);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, partition: PartitionId) -> Option<&T> {
        self.iter().find(|(p, _)| *p == partition).map(|(_, v)| v)
    }

    /// Baselines after `known` (exclusive) up to `target` (inclusive), oldest
    /// first. `None` means the caller knows no partition yet.
    pub fn between(
        &self,
        known: Option<PartitionId>,
        target: PartitionId,
    ) -> impl Iterator<Item = (PartitionId, &T)> {
        self.iter()
            .filter(move |(p, _)| known.map_or(true, |k| *p > k) && *p <= target)
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (PartitionId, &T)> {
        let cap = self.entries.len();
        (0..self.len).filter_map(move |i| {
            let idx = (self.head + i) % cap;
            self.entries[idx]
                .as_ref()
                .map(|entry| (entry.partition, &entry.value))
        })
    }
}
