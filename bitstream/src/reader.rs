//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};

const COORD_INTEGER_BITS: u8 = 14;
const COORD_FRACTIONAL_BITS: u8 = 5;
const COORD_RESOLUTION: f32 = 1.0 / (1u32 << COORD_FRACTIONAL_BITS) as f32;
const NORMAL_FRACTIONAL_BITS: u8 = 11;
const NORMAL_RESOLUTION: f32 = 1.0 / ((1u32 << NORMAL_FRACTIONAL_BITS) - 1) as f32;

/// A bit-level reader for decoding packed binary data.
///
/// Bits are consumed least-significant first within each byte, which is the
/// order used by every bit-packed structure in a demo stream. All read
/// operations are bounds-checked and return errors on failure; the reader
/// never panics on malformed input.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Returns the total length of the underlying buffer in bits.
    #[must_use]
    pub const fn len_bits(&self) -> usize {
        self.data.len().saturating_mul(8)
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.len_bits().saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Moves the cursor to an absolute bit position.
    pub fn seek(&mut self, position: usize) -> BitResult<()> {
        if position > self.len_bits() {
            return Err(BitError::SeekOutOfRange {
                position,
                len_bits: self.len_bits(),
            });
        }
        self.bit_pos = position;
        Ok(())
    }

    /// Rewinds the cursor by `bits`, undoing an over-read.
    pub fn move_back(&mut self, bits: usize) -> BitResult<()> {
        if bits > self.bit_pos {
            return Err(BitError::SeekOutOfRange {
                position: 0,
                len_bits: self.len_bits(),
            });
        }
        self.bit_pos -= bits;
        Ok(())
    }

    /// Skips `bits` without decoding them.
    pub fn skip(&mut self, bits: usize) -> BitResult<()> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    /// Reads a single bit as a boolean.
    pub fn read_bit(&mut self) -> BitResult<bool> {
        if self.bits_remaining() == 0 {
            return Err(BitError::UnexpectedEof {
                requested: 1,
                available: 0,
            });
        }
        let bit = (self.data[self.bit_pos / 8] >> (self.bit_pos % 8)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 32 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u32> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount {
                bits: bits as usize,
                max_bits: 32,
            });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits as usize)?;
        let value = self.load(bits);
        self.bit_pos += bits as usize;
        Ok(value)
    }

    /// Returns up to `bits` bits at the cursor without advancing.
    ///
    /// Near the end of the buffer only the remaining bits are loaded; the
    /// missing high bits read as zero. Returns the value and the number of
    /// bits actually loaded.
    #[must_use]
    pub fn peek_bits(&self, bits: u8) -> (u32, u8) {
        let width = bits.min(32).min(self.bits_remaining().min(32) as u8);
        if width == 0 {
            return (0, 0);
        }
        (self.load(width), width)
    }

    /// Reads 64 bits as a little-endian unsigned integer.
    pub fn read_u64_bits(&mut self) -> BitResult<u64> {
        self.ensure_bits(64)?;
        let low = u64::from(self.read_bits(32)?);
        let high = u64::from(self.read_bits(32)?);
        Ok(low | (high << 32))
    }

    /// Reads an unsigned varint of at most 5 bytes.
    pub fn read_varu32(&mut self) -> BitResult<u32> {
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_bits(8)?;
            result |= (byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(BitError::InvalidVarint)
    }

    /// Reads a zigzag-encoded signed varint of at most 5 bytes.
    pub fn read_vars32(&mut self) -> BitResult<i32> {
        let value = self.read_varu32()?;
        Ok(((value >> 1) as i32) ^ -((value & 1) as i32))
    }

    /// Reads an unsigned varint of at most 10 bytes.
    pub fn read_varu64(&mut self) -> BitResult<u64> {
        let mut result = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = self.read_bits(8)?;
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(BitError::InvalidVarint)
    }

    /// Reads a zigzag-encoded signed varint of at most 10 bytes.
    pub fn read_vars64(&mut self) -> BitResult<i64> {
        let value = self.read_varu64()?;
        Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
    }

    /// Reads a prefix-coded unsigned value: 6 bits, where the top two bits
    /// select a 0/4/8/28-bit extension of the high part.
    pub fn read_ubit_var(&mut self) -> BitResult<u32> {
        let value = self.read_bits(6)?;
        let extended = match value & 0x30 {
            16 => (value & 15) | (self.read_bits(4)? << 4),
            32 => (value & 15) | (self.read_bits(8)? << 4),
            48 => (value & 15) | (self.read_bits(28)? << 4),
            _ => value,
        };
        Ok(extended)
    }

    /// Reads the field-path flavour of a variable-width value: a ladder of
    /// flag bits selecting a 2, 4, 10, 17 or 31 bit payload.
    pub fn read_ubit_var_fp(&mut self) -> BitResult<u32> {
        if self.read_bit()? {
            return self.read_bits(2);
        }
        if self.read_bit()? {
            return self.read_bits(4);
        }
        if self.read_bit()? {
            return self.read_bits(10);
        }
        if self.read_bit()? {
            return self.read_bits(17);
        }
        self.read_bits(31)
    }

    /// Reads an IEEE-754 single precision float.
    pub fn read_f32(&mut self) -> BitResult<f32> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    /// Reads a world coordinate: optional 14-bit integer part and 5-bit
    /// fraction behind presence flags, then a sign bit.
    pub fn read_bit_coord(&mut self) -> BitResult<f32> {
        let has_int = self.read_bit()?;
        let has_fract = self.read_bit()?;
        if !has_int && !has_fract {
            return Ok(0.0);
        }
        let negative = self.read_bit()?;
        let int_part = if has_int {
            self.read_bits(COORD_INTEGER_BITS)? + 1
        } else {
            0
        };
        let fract_part = if has_fract {
            self.read_bits(COORD_FRACTIONAL_BITS)?
        } else {
            0
        };
        let value = int_part as f32 + fract_part as f32 * COORD_RESOLUTION;
        Ok(if negative { -value } else { value })
    }

    /// Reads a single normal component in `[-1, 1]`.
    pub fn read_bit_normal(&mut self) -> BitResult<f32> {
        let negative = self.read_bit()?;
        let magnitude = self.read_bits(NORMAL_FRACTIONAL_BITS)? as f32 * NORMAL_RESOLUTION;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Reads a unit vector packed as optional x/y components with z
    /// reconstructed from the unit length.
    pub fn read_bit_normal_vec3(&mut self) -> BitResult<[f32; 3]> {
        let has_x = self.read_bit()?;
        let has_y = self.read_bit()?;
        let x = if has_x { self.read_bit_normal()? } else { 0.0 };
        let y = if has_y { self.read_bit_normal()? } else { 0.0 };
        let negative_z = self.read_bit()?;
        let sum = x.mul_add(x, y * y);
        let z = if sum < 1.0 { (1.0 - sum).sqrt() } else { 0.0 };
        Ok([x, y, if negative_z { -z } else { z }])
    }

    /// Reads an angle in degrees quantized to `bits` bits.
    pub fn read_bit_angle(&mut self, bits: u8) -> BitResult<f32> {
        if bits == 0 || bits > 32 {
            return Err(BitError::InvalidBitCount {
                bits: bits as usize,
                max_bits: 32,
            });
        }
        let raw = self.read_bits(bits)?;
        Ok(raw as f32 * 360.0 / (1u64 << bits) as f32)
    }

    /// Reads a NUL-terminated string of at most `max_len` bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; names in demo streams
    /// are not guaranteed to be well-formed.
    pub fn read_cstring(&mut self, max_len: usize) -> BitResult<String> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_bits(8)? as u8;
            if byte == 0 {
                break;
            }
            if bytes.len() == max_len {
                return Err(BitError::StringTooLong { max: max_len });
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads `len` whole bytes starting at the current (possibly unaligned)
    /// bit position.
    pub fn read_bytes(&mut self, len: usize) -> BitResult<Vec<u8>> {
        self.ensure_bits(len.saturating_mul(8))?;
        if self.bit_pos % 8 == 0 {
            let start = self.bit_pos / 8;
            self.bit_pos += len * 8;
            return Ok(self.data[start..start + len].to_vec());
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    /// Reads `bits` bits into a byte vector; a trailing partial byte holds
    /// the remaining low bits.
    pub fn read_bits_as_bytes(&mut self, bits: usize) -> BitResult<Vec<u8>> {
        self.ensure_bits(bits)?;
        let mut out = self.read_bytes(bits / 8)?;
        let rem = (bits % 8) as u8;
        if rem > 0 {
            out.push(self.read_bits(rem)? as u8);
        }
        Ok(out)
    }

    /// Aligns to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let rem = self.bit_pos % 8;
        if rem == 0 {
            return Ok(());
        }
        self.skip(8 - rem)
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEof {
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    /// Loads `bits` (1..=32) bits at the cursor; the caller checked bounds.
    fn load(&self, bits: u8) -> u32 {
        let start = self.bit_pos / 8;
        let shift = self.bit_pos % 8;
        let end = (start + 5).min(self.data.len());
        let mut acc = 0u64;
        for (i, byte) in self.data[start..end].iter().enumerate() {
            acc |= u64::from(*byte) << (8 * i);
        }
        let mask = if bits == 32 {
            u64::from(u32::MAX)
        } else {
            (1u64 << bits) - 1
        };
        ((acc >> shift) & mask) as u32
    }
}
