//! Byte-level unsigned varints (7 data bits plus a continuation bit per byte).
//!
//! These helpers work directly on byte slices for envelope framing, where the
//! caller must tell "not enough bytes yet" apart from "malformed".

use crate::error::{BitError, BitResult};

/// Maximum encoded length of a 32-bit varint.
pub const MAX_VARINT32_BYTES: usize = 5;

/// Decodes a varint from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the varint does, and
/// `Ok(Some((value, consumed)))` on success.
///
/// # Errors
///
/// Returns [`BitError::InvalidVarint`] if the fifth byte still carries a
/// continuation bit.
pub fn decode_u32(buf: &[u8]) -> BitResult<Option<(u32, usize)>> {
    let mut value = 0u32;
    for (i, byte) in buf.iter().take(MAX_VARINT32_BYTES).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT32_BYTES {
        return Err(BitError::InvalidVarint);
    }
    Ok(None)
}

/// Appends the varint encoding of `value` to `out`, returning the number of
/// bytes written.
pub fn encode_u32(mut value: u32, out: &mut Vec<u8>) -> usize {
    let start = out.len();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out.len() - start
}

/// Returns the number of bytes `value` occupies when varint-encoded.
#[must_use]
pub const fn encoded_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x001F_FFFF => 3,
        0x0020_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}
