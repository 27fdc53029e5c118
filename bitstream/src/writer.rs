//! Bit-level writer for encoding packed binary data.
//!
//! The writer mirrors every [`BitReader`](crate::BitReader) operation so test
//! fixtures and tooling can produce streams the decoders accept.

use crate::error::{BitError, BitResult};

/// A growable bit-level writer, least-significant bit first.
///
/// Writes are accumulated in an internal buffer. Call [`finish`](Self::finish)
/// to get the final byte buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.bit_len
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, value: bool) {
        let bit = self.bit_len % 8;
        if bit == 0 {
            self.bytes.push(0);
        }
        if value {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 1 << bit;
            }
        }
        self.bit_len += 1;
    }

    /// Writes up to 32 bits from an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 32`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u32, bits: u8) -> BitResult<()> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount {
                bits: bits as usize,
                max_bits: 32,
            });
        }
        if bits < 32 && u64::from(value) >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange {
                value: u64::from(value),
                bits: bits as usize,
            });
        }
        for i in 0..bits {
            self.write_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Writes 64 bits, little-endian.
    pub fn write_u64_bits(&mut self, value: u64) {
        for i in 0..64 {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes an unsigned varint.
    pub fn write_varu32(&mut self, value: u32) {
        self.write_varu64(u64::from(value));
    }

    /// Writes a zigzag-encoded signed varint.
    pub fn write_vars32(&mut self, value: i32) {
        let zigzag = ((value << 1) ^ (value >> 31)) as u32;
        self.write_varu32(zigzag);
    }

    /// Writes an unsigned 64-bit varint.
    pub fn write_varu64(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.write_byte(byte);
                return;
            }
            self.write_byte(byte | 0x80);
        }
    }

    /// Writes a zigzag-encoded signed 64-bit varint.
    pub fn write_vars64(&mut self, value: i64) {
        let zigzag = ((value << 1) ^ (value >> 63)) as u64;
        self.write_varu64(zigzag);
    }

    /// Writes a prefix-coded value readable by
    /// [`BitReader::read_ubit_var`](crate::BitReader::read_ubit_var).
    pub fn write_ubit_var(&mut self, value: u32) {
        let (selector, high_bits) = if value < 16 {
            self.push_bits(value, 6);
            return;
        } else if value < (1 << 8) {
            (16, 4)
        } else if value < (1 << 12) {
            (32, 8)
        } else {
            (48, 28)
        };
        self.push_bits((value & 15) | selector, 6);
        self.push_bits(value >> 4, high_bits);
    }

    /// Writes a value readable by
    /// [`BitReader::read_ubit_var_fp`](crate::BitReader::read_ubit_var_fp).
    pub fn write_ubit_var_fp(&mut self, value: u32) {
        const LADDER: [(u8, u32); 4] = [(2, 1 << 2), (4, 1 << 4), (10, 1 << 10), (17, 1 << 17)];
        for (bits, limit) in LADDER {
            if value < limit {
                self.write_bit(true);
                self.push_bits(value, bits);
                return;
            }
            self.write_bit(false);
        }
        self.push_bits(value & 0x7FFF_FFFF, 31);
    }

    /// Writes an IEEE-754 single precision float.
    pub fn write_f32(&mut self, value: f32) {
        self.push_bits(value.to_bits(), 32);
    }

    /// Writes a NUL-terminated string.
    pub fn write_cstring(&mut self, value: &str) {
        for byte in value.bytes() {
            self.write_byte(byte);
        }
        self.write_byte(0);
    }

    /// Writes whole bytes at the current bit position.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.write_byte(*byte);
        }
    }

    /// Writes one byte at the current bit position.
    pub fn write_byte(&mut self, byte: u8) {
        self.push_bits(u32::from(byte), 8);
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        self.bit_len = self.bytes.len() * 8;
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, its high bits are zero.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    fn push_bits(&mut self, value: u32, bits: u8) {
        for i in 0..bits {
            self.write_bit((value >> i) & 1 == 1);
        }
    }
}
