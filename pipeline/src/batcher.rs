//! Groups heavy packets into batches by size or age.

use std::time::{Duration, Instant};

use wire::RawPacket;

/// Accumulates packets until their payloads reach `max_bytes` or the oldest
/// has waited `max_wait`, whichever comes first.
#[derive(Debug)]
pub struct Batcher {
    packets: Vec<RawPacket>,
    bytes: usize,
    opened: Option<Instant>,
    max_bytes: usize,
    max_wait: Duration,
}

impl Batcher {
    #[must_use]
    pub const fn new(max_bytes: usize, max_wait: Duration) -> Self {
        Self {
            packets: Vec::new(),
            bytes: 0,
            opened: None,
            max_bytes,
            max_wait,
        }
    }

    /// Payload bytes currently held.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Adds a packet; returns the batch if a threshold was reached.
    pub fn push(&mut self, packet: RawPacket, now: Instant) -> Option<Vec<RawPacket>> {
        let opened = *self.opened.get_or_insert(now);
        self.bytes += packet.payload.len();
        self.packets.push(packet);
        if self.bytes >= self.max_bytes || now.saturating_duration_since(opened) >= self.max_wait {
            return self.take();
        }
        None
    }

    /// Returns the batch if it has waited long enough.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<RawPacket>> {
        let opened = self.opened?;
        if now.saturating_duration_since(opened) >= self.max_wait {
            return self.take();
        }
        None
    }

    /// Empties the batcher regardless of thresholds.
    pub fn take(&mut self) -> Option<Vec<RawPacket>> {
        if self.packets.is_empty() {
            return None;
        }
        self.bytes = 0;
        self.opened = None;
        Some(std::mem::take(&mut self.packets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::DemoSource;

    fn packet(sequence: u64, bytes: usize) -> RawPacket {
        RawPacket {
            sequence,
            type_id: 7,
            source: DemoSource::Replay,
            tick: 0,
            compressed: false,
            payload: vec![0; bytes],
        }
    }

    #[test]
    fn flushes_on_size() {
        let now = Instant::now();
        let mut batcher = Batcher::new(100, Duration::from_secs(10));
        assert!(batcher.push(packet(0, 60), now).is_none());
        assert_eq!(batcher.bytes(), 60);
        let batch = batcher.push(packet(1, 40), now).unwrap();
        assert_eq!(batch.iter().map(|p| p.sequence).collect::<Vec<_>>(), [0, 1]);
        assert!(batcher.is_empty());
        assert_eq!(batcher.bytes(), 0);
    }

    #[test]
    fn flushes_on_age() {
        let start = Instant::now();
        let mut batcher = Batcher::new(1 << 20, Duration::from_millis(5));
        assert!(batcher.push(packet(0, 1), start).is_none());
        assert!(batcher.poll(start + Duration::from_millis(1)).is_none());
        let batch = batcher.poll(start + Duration::from_millis(5)).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batcher.poll(start + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn age_counts_from_first_packet() {
        let start = Instant::now();
        let mut batcher = Batcher::new(1 << 20, Duration::from_millis(5));
        batcher.push(packet(0, 1), start);
        let batch = batcher.push(packet(1, 1), start + Duration::from_millis(6)).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn take_on_empty_is_none() {
        let mut batcher = Batcher::new(1, Duration::ZERO);
        assert!(batcher.take().is_none());
    }
}
