//! Restores delivery order to results that complete out of order.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::error::{ParserError, ParserResult};
use crate::protocol::Slot;

struct Pending<T> {
    slot: Slot,
    item: T,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.slot.cmp(&other.slot)
    }
}

/// Min-heap of completed slots, released strictly in slot order.
///
/// Slots start at 0 and each must be pushed exactly once.
pub struct Sequencer<T> {
    next: Slot,
    heap: BinaryHeap<Reverse<Pending<T>>>,
    /// Slots in `heap`.
    held: HashSet<Slot>,
    peak: usize,
}

impl<T> Default for Sequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Sequencer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("next", &self.next)
            .field("held", &self.heap.len())
            .field("peak", &self.peak)
            .finish()
    }
}

impl<T> Sequencer<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 0,
            heap: BinaryHeap::new(),
            held: HashSet::new(),
            peak: 0,
        }
    }

    /// Slot that must arrive before anything else is released.
    #[must_use]
    pub const fn next_expected(&self) -> Slot {
        self.next
    }

    /// Number of results held back waiting for an earlier slot.
    #[must_use]
    pub fn held(&self) -> usize {
        self.heap.len()
    }

    /// Largest number of results ever held at once.
    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Accepts the result for `slot`.
    ///
    /// A slot below the next expected one was already released.
    pub fn push(&mut self, slot: Slot, item: T) -> ParserResult<()> {
        if slot < self.next {
            return Err(ParserError::invariant(format!(
                "slot {slot} completed after slot {} was expected",
                self.next
            )));
        }
        if !self.held.insert(slot) {
            return Err(ParserError::invariant(format!("slot {slot} completed twice")));
        }
        self.heap.push(Reverse(Pending { slot, item }));
        self.peak = self.peak.max(self.heap.len());
        Ok(())
    }

    /// Pops every result that is now in order.
    pub fn drain_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(p)| p.slot == self.next)
        {
            if let Some(Reverse(p)) = self.heap.pop() {
                self.held.remove(&p.slot);
                ready.push(p.item);
                self.next += 1;
            }
        }
        ready
    }
}
