//! Chunk-tolerant envelope extraction.

use std::ops::Range;

use bitstream::varint;
use tracing::{trace, warn};

use crate::error::{LimitKind, WireError, WireResult};
use crate::header::{DemoHeader, HEADER_SIZE};
use crate::limits::Limits;
use crate::packet::{DemoSource, RawPacket, COMPRESSED_FLAG};
use crate::stage::Stage;

/// Bytes between the type varint and the payload of a broadcast envelope:
/// tick, one reserved byte, frame length.
const BROADCAST_PREFIX: usize = 4 + 1 + 4;

/// Turns an arbitrarily chunked byte stream into [`RawPacket`]s.
///
/// Bytes that do not yet form a complete envelope are held as a tail and
/// prepended to the next chunk, so the packets produced never depend on
/// where the chunk boundaries fall.
#[derive(Debug)]
pub struct PacketExtractor {
    source: DemoSource,
    limits: Limits,
    pending: Vec<u8>,
    header: Option<DemoHeader>,
    next_sequence: u64,
}

struct Envelope {
    raw_type: u32,
    tick: u32,
    payload: Range<usize>,
}

impl PacketExtractor {
    #[must_use]
    pub const fn new(source: DemoSource, limits: Limits) -> Self {
        Self {
            source,
            limits,
            pending: Vec::new(),
            header: None,
            next_sequence: 0,
        }
    }

    #[must_use]
    pub const fn source(&self) -> DemoSource {
        self.source
    }

    /// The replay header, once the first 16 bytes have arrived.
    #[must_use]
    pub const fn header(&self) -> Option<&DemoHeader> {
        self.header.as_ref()
    }

    /// Number of buffered bytes not yet forming a complete envelope.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Sequence number the next packet will carry.
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Appends `chunk` and returns every envelope it completed, in byte order.
    pub fn push(&mut self, chunk: &[u8]) -> WireResult<Vec<RawPacket>> {
        self.pending.extend_from_slice(chunk);

        let mut offset = 0usize;
        if self.source == DemoSource::Replay && self.header.is_none() {
            let Some(header) = DemoHeader::parse(&self.pending) else {
                return Ok(Vec::new());
            };
            if !header.has_valid_magic() {
                warn!(magic = ?header.magic, "replay header magic mismatch");
            }
            self.header = Some(header);
            offset = HEADER_SIZE;
        }

        let mut packets = Vec::new();
        while let Some((envelope, consumed)) =
            parse_envelope(&self.pending[offset..], self.source, &self.limits, offset)?
        {
            let payload = self.pending[offset + envelope.payload.start..offset + envelope.payload.end].to_vec();
            let packet = RawPacket {
                sequence: self.next_sequence,
                type_id: envelope.raw_type & !COMPRESSED_FLAG,
                source: self.source,
                tick: envelope.tick,
                compressed: envelope.raw_type & COMPRESSED_FLAG != 0,
                payload,
            };
            trace!(
                sequence = packet.sequence,
                command = packet.command().name(),
                tick = packet.tick,
                bytes = packet.payload.len(),
                "extracted packet"
            );
            self.next_sequence += 1;
            offset += consumed;
            packets.push(packet);
        }

        self.pending.drain(..offset);
        if self.pending.len() > self.limits.max_pending_bytes {
            return Err(WireError::LimitsExceeded {
                kind: LimitKind::PendingBytes,
                limit: self.limits.max_pending_bytes,
                actual: self.pending.len(),
            });
        }
        Ok(packets)
    }

    /// Ends the stream, discarding any incomplete tail.
    ///
    /// A non-empty tail means the input was truncated; it is logged and its
    /// size returned so callers can record it.
    pub fn finish(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            warn!(
                bytes = dropped,
                next_sequence = self.next_sequence,
                "stream ended inside an envelope"
            );
        }
        self.pending.clear();
        dropped
    }
}

impl<'a> Stage<&'a [u8]> for PacketExtractor {
    type Output = RawPacket;
    type Error = WireError;

    fn process(&mut self, chunk: &'a [u8]) -> WireResult<Vec<RawPacket>> {
        self.push(chunk)
    }

    fn finalize(&mut self) -> WireResult<Vec<RawPacket>> {
        self.finish();
        Ok(Vec::new())
    }
}

/// Parses one envelope from the front of `buf`.
///
/// `Ok(None)` means `buf` ends before the envelope does.
fn parse_envelope(
    buf: &[u8],
    source: DemoSource,
    limits: &Limits,
    base: usize,
) -> WireResult<Option<(Envelope, usize)>> {
    let mut pos = 0usize;
    let Some(raw_type) = read_varint(buf, &mut pos, base)? else {
        return Ok(None);
    };

    let (tick, frame_len) = match source {
        DemoSource::Replay => {
            let Some(tick) = read_varint(buf, &mut pos, base)? else {
                return Ok(None);
            };
            let Some(len) = read_varint(buf, &mut pos, base)? else {
                return Ok(None);
            };
            (tick, len)
        }
        DemoSource::Broadcast => {
            let Some(prefix) = buf.get(pos..pos + BROADCAST_PREFIX) else {
                return Ok(None);
            };
            let tick = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
            let len = u32::from_le_bytes([prefix[5], prefix[6], prefix[7], prefix[8]]);
            pos += BROADCAST_PREFIX;
            (tick, len)
        }
    };

    let frame_len = frame_len as usize;
    if frame_len > limits.max_frame_bytes {
        return Err(WireError::LimitsExceeded {
            kind: LimitKind::FrameBytes,
            limit: limits.max_frame_bytes,
            actual: frame_len,
        });
    }
    if buf.len() - pos < frame_len {
        return Ok(None);
    }

    let envelope = Envelope {
        raw_type,
        tick,
        payload: pos..pos + frame_len,
    };
    Ok(Some((envelope, pos + frame_len)))
}

fn read_varint(buf: &[u8], pos: &mut usize, base: usize) -> WireResult<Option<u32>> {
    match varint::decode_u32(&buf[*pos..]) {
        Ok(Some((value, used))) => {
            *pos += used;
            Ok(Some(value))
        }
        Ok(None) => Ok(None),
        Err(_) => Err(WireError::InvalidVarint { offset: base + *pos }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode_frame, DemoCommand};

    fn replay_bytes(frames: &[(DemoCommand, u32, &[u8])]) -> Vec<u8> {
        let mut out = DemoHeader::default().encode().to_vec();
        for (command, tick, payload) in frames {
            encode_frame(&mut out, DemoSource::Replay, *command, false, *tick, payload);
        }
        out
    }

    #[test]
    fn single_replay_packet() {
        let mut bytes = DemoHeader::default().encode().to_vec();
        bytes.extend_from_slice(&[0x01, 0x05, 0x03, 0xAA, 0xBB, 0xCC]);

        let mut extractor = PacketExtractor::new(DemoSource::Replay, Limits::default());
        let packets = extractor.push(&bytes).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].sequence, 0);
        assert_eq!(packets[0].type_id, 1);
        assert_eq!(packets[0].tick, 5);
        assert_eq!(packets[0].payload, vec![0xAA, 0xBB, 0xCC]);
        assert!(!packets[0].compressed);
        assert_eq!(extractor.pending_bytes(), 0);
        assert_eq!(extractor.finish(), 0);
    }

    #[test]
    fn header_split_across_chunks() {
        let bytes = replay_bytes(&[(DemoCommand::SyncTick, 0, &[])]);
        let mut extractor = PacketExtractor::new(DemoSource::Replay, Limits::default());
        assert!(extractor.push(&bytes[..10]).unwrap().is_empty());
        assert!(extractor.header().is_none());
        let packets = extractor.push(&bytes[10..]).unwrap();
        assert!(extractor.header().is_some());
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].command(), DemoCommand::SyncTick);
    }

    #[test]
    fn compressed_flag_is_stripped() {
        let mut bytes = DemoHeader::default().encode().to_vec();
        encode_frame(&mut bytes, DemoSource::Replay, DemoCommand::Packet, true, 3, &[1]);
        let mut extractor = PacketExtractor::new(DemoSource::Replay, Limits::default());
        let packets = extractor.push(&bytes).unwrap();
        assert_eq!(packets[0].command(), DemoCommand::Packet);
        assert!(packets[0].compressed);
    }

    #[test]
    fn broadcast_has_no_header() {
        let mut bytes = Vec::new();
        encode_frame(&mut bytes, DemoSource::Broadcast, DemoCommand::Packet, false, 900, &[7, 8]);
        encode_frame(&mut bytes, DemoSource::Broadcast, DemoCommand::FullPacket, false, 901, &[]);
        let mut extractor = PacketExtractor::new(DemoSource::Broadcast, Limits::default());
        let packets = extractor.push(&bytes).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].tick, 900);
        assert_eq!(packets[0].payload, vec![7, 8]);
        assert_eq!(packets[1].sequence, 1);
        assert_eq!(packets[1].command(), DemoCommand::FullPacket);
    }

    #[test]
    fn truncated_tail_is_reported_on_finish() {
        let bytes = replay_bytes(&[(DemoCommand::Packet, 1, &[1, 2, 3, 4])]);
        let mut extractor = PacketExtractor::new(DemoSource::Replay, Limits::default());
        assert!(extractor.push(&bytes[..bytes.len() - 1]).unwrap().is_empty());
        assert_eq!(extractor.finish(), bytes.len() - 1 - HEADER_SIZE);
        assert_eq!(extractor.pending_bytes(), 0);
    }

    #[test]
    fn malformed_varint_is_an_error() {
        let mut bytes = DemoHeader::default().encode().to_vec();
        bytes.extend_from_slice(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        let mut extractor = PacketExtractor::new(DemoSource::Replay, Limits::default());
        let err = extractor.push(&bytes).unwrap_err();
        assert_eq!(err, WireError::InvalidVarint { offset: HEADER_SIZE });
    }

    #[test]
    fn oversized_frame_rejected_before_buffering() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0x07]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&1_000_000u32.to_le_bytes());
        let mut extractor = PacketExtractor::new(DemoSource::Broadcast, Limits::for_testing());
        let err = extractor.push(&bytes).unwrap_err();
        assert!(matches!(
            err,
            WireError::LimitsExceeded {
                kind: LimitKind::FrameBytes,
                ..
            }
        ));
    }
}
