//! Field-path list decoding (and encoding, for fixtures and tooling).

use bitstream::{BitError, BitReader, BitWriter};

use crate::error::{SchemaError, SchemaResult};
use crate::field_path::{FieldPath, FieldPathBuilder, MAX_FIELD_PATH_DEPTH};
use crate::huffman::{self, FieldOp, MAX_CODE_BITS};

/// Lazily decodes the field paths of one entity update.
///
/// Single pass: the iterator owns the cursor of the reader it borrows and
/// stops at the finish code, leaving the reader positioned at the first
/// field value. After an error the iterator is fused.
#[derive(Debug)]
pub struct FieldPathDecoder<'r, 'a> {
    reader: &'r mut BitReader<'a>,
    builder: FieldPathBuilder,
    finished: bool,
}

impl<'r, 'a> FieldPathDecoder<'r, 'a> {
    pub fn new(reader: &'r mut BitReader<'a>) -> Self {
        Self {
            reader,
            builder: FieldPathBuilder::new(),
            finished: false,
        }
    }

    fn step(&mut self) -> SchemaResult<Option<FieldPath>> {
        let table = huffman::table();
        let width = usize::from(MAX_CODE_BITS).min(self.reader.bits_remaining()) as u8;
        let window = self.reader.read_bits(width)?;
        let (op, len) = table.lookup(window);
        if len > width {
            return Err(BitError::UnexpectedEof {
                requested: usize::from(len),
                available: usize::from(width),
            }
            .into());
        }
        self.reader.move_back(usize::from(width - len))?;
        if op == FieldOp::FieldPathEncodeFinish {
            return Ok(None);
        }
        apply(op, &mut self.builder, self.reader)?;
        self.builder.build().map(Some)
    }
}

impl Iterator for FieldPathDecoder<'_, '_> {
    type Item = SchemaResult<FieldPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(path)) => Some(Ok(path)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Decodes a complete field-path list into `out` (cleared first).
pub fn decode_field_paths(reader: &mut BitReader<'_>, out: &mut Vec<FieldPath>) -> SchemaResult<()> {
    out.clear();
    for path in FieldPathDecoder::new(reader) {
        out.push(path?);
    }
    Ok(())
}

fn ubit_var_fp(reader: &mut BitReader<'_>) -> SchemaResult<i32> {
    Ok(reader.read_ubit_var_fp()? as i32)
}

fn ubit_var(reader: &mut BitReader<'_>) -> SchemaResult<i32> {
    Ok(reader.read_ubit_var()? as i32)
}

fn bits(reader: &mut BitReader<'_>, count: u8) -> SchemaResult<i32> {
    Ok(reader.read_bits(count)? as i32)
}

fn push_many(
    builder: &mut FieldPathBuilder,
    reader: &mut BitReader<'_>,
    count: usize,
    packed: bool,
) -> SchemaResult<()> {
    for _ in 0..count {
        let value = if packed {
            bits(reader, 5)?
        } else {
            ubit_var_fp(reader)?
        };
        builder.push(value)?;
    }
    Ok(())
}

/// Adds an optional delta to every current level.
fn non_topological(
    builder: &mut FieldPathBuilder,
    reader: &mut BitReader<'_>,
    delta: fn(&mut BitReader<'_>) -> SchemaResult<i32>,
) -> SchemaResult<()> {
    for position in 0..=builder.last() {
        if reader.read_bit()? {
            let value = delta(reader)?;
            builder.add(position, value);
        }
    }
    Ok(())
}

fn apply(op: FieldOp, builder: &mut FieldPathBuilder, reader: &mut BitReader<'_>) -> SchemaResult<()> {
    match op {
        FieldOp::PlusOne => builder.add_last(1),
        FieldOp::PlusTwo => builder.add_last(2),
        FieldOp::PlusThree => builder.add_last(3),
        FieldOp::PlusFour => builder.add_last(4),
        FieldOp::PlusN => builder.add_last(ubit_var_fp(reader)? + 5),
        FieldOp::PushOneLeftDeltaZeroRightZero => builder.push(0)?,
        FieldOp::PushOneLeftDeltaZeroRightNonZero => builder.push(ubit_var_fp(reader)?)?,
        FieldOp::PushOneLeftDeltaOneRightZero => {
            builder.add_last(1);
            builder.push(0)?;
        }
        FieldOp::PushOneLeftDeltaOneRightNonZero => {
            builder.add_last(1);
            builder.push(ubit_var_fp(reader)?)?;
        }
        FieldOp::PushOneLeftDeltaNRightZero => {
            builder.add_last(ubit_var_fp(reader)?);
            builder.push(0)?;
        }
        FieldOp::PushOneLeftDeltaNRightNonZero => {
            builder.add_last(ubit_var_fp(reader)? + 2);
            builder.push(ubit_var_fp(reader)? + 1)?;
        }
        FieldOp::PushOneLeftDeltaNRightNonZeroPack6Bits => {
            builder.add_last(bits(reader, 3)? + 2);
            builder.push(bits(reader, 3)? + 1)?;
        }
        FieldOp::PushOneLeftDeltaNRightNonZeroPack8Bits => {
            builder.add_last(bits(reader, 4)? + 2);
            builder.push(bits(reader, 4)? + 1)?;
        }
        FieldOp::PushTwoLeftDeltaZero => push_many(builder, reader, 2, false)?,
        FieldOp::PushTwoPack5LeftDeltaZero => push_many(builder, reader, 2, true)?,
        FieldOp::PushThreeLeftDeltaZero => push_many(builder, reader, 3, false)?,
        FieldOp::PushThreePack5LeftDeltaZero => push_many(builder, reader, 3, true)?,
        FieldOp::PushTwoLeftDeltaOne => {
            builder.add_last(1);
            push_many(builder, reader, 2, false)?;
        }
        FieldOp::PushTwoPack5LeftDeltaOne => {
            builder.add_last(1);
            push_many(builder, reader, 2, true)?;
        }
        FieldOp::PushThreeLeftDeltaOne => {
            builder.add_last(1);
            push_many(builder, reader, 3, false)?;
        }
        FieldOp::PushThreePack5LeftDeltaOne => {
            builder.add_last(1);
            push_many(builder, reader, 3, true)?;
        }
        FieldOp::PushTwoLeftDeltaN => {
            builder.add_last(ubit_var(reader)? + 2);
            push_many(builder, reader, 2, false)?;
        }
        FieldOp::PushTwoPack5LeftDeltaN => {
            builder.add_last(ubit_var(reader)? + 2);
            push_many(builder, reader, 2, true)?;
        }
        FieldOp::PushThreeLeftDeltaN => {
            builder.add_last(ubit_var(reader)? + 2);
            push_many(builder, reader, 3, false)?;
        }
        FieldOp::PushThreePack5LeftDeltaN => {
            builder.add_last(ubit_var(reader)? + 2);
            push_many(builder, reader, 3, true)?;
        }
        FieldOp::PushN => {
            let count = reader.read_ubit_var()? as usize;
            builder.add_last(ubit_var(reader)?);
            push_many(builder, reader, count.min(MAX_FIELD_PATH_DEPTH), false)?;
            if count > MAX_FIELD_PATH_DEPTH {
                return Err(SchemaError::FieldPathTooDeep {
                    depth: MAX_FIELD_PATH_DEPTH,
                });
            }
        }
        FieldOp::PushNAndNonTopological => {
            non_topological(builder, reader, |r| Ok(r.read_vars32()? + 1))?;
            let count = reader.read_ubit_var()? as usize;
            push_many(builder, reader, count.min(MAX_FIELD_PATH_DEPTH), false)?;
            if count > MAX_FIELD_PATH_DEPTH {
                return Err(SchemaError::FieldPathTooDeep {
                    depth: MAX_FIELD_PATH_DEPTH,
                });
            }
        }
        FieldOp::PopOnePlusOne => {
            builder.pop(1, op.name())?;
            builder.add_last(1);
        }
        FieldOp::PopOnePlusN => {
            builder.pop(1, op.name())?;
            builder.add_last(ubit_var_fp(reader)? + 1);
        }
        FieldOp::PopAllButOnePlusOne => {
            builder.pop(builder.last(), op.name())?;
            builder.add_last(1);
        }
        FieldOp::PopAllButOnePlusN => {
            builder.pop(builder.last(), op.name())?;
            builder.add_last(ubit_var_fp(reader)? + 1);
        }
        FieldOp::PopAllButOnePlusNPack3Bits => {
            builder.pop(builder.last(), op.name())?;
            builder.add_last(bits(reader, 3)? + 1);
        }
        FieldOp::PopAllButOnePlusNPack6Bits => {
            builder.pop(builder.last(), op.name())?;
            builder.add_last(bits(reader, 6)? + 1);
        }
        FieldOp::PopNPlusOne => {
            builder.pop(reader.read_ubit_var_fp()? as usize, op.name())?;
            builder.add_last(1);
        }
        FieldOp::PopNPlusN => {
            builder.pop(reader.read_ubit_var_fp()? as usize, op.name())?;
            builder.add_last(reader.read_vars32()?);
        }
        FieldOp::PopNAndNonTopographical => {
            builder.pop(reader.read_ubit_var_fp()? as usize, op.name())?;
            non_topological(builder, reader, |r| Ok(r.read_vars32()?))?;
        }
        FieldOp::NonTopoComplex => {
            non_topological(builder, reader, |r| Ok(r.read_vars32()?))?;
        }
        FieldOp::NonTopoPenultimatePlusOne => {
            let last = builder.last();
            if last == 0 {
                return Err(SchemaError::FieldPathUnderflow { op: op.name() });
            }
            builder.add(last - 1, 1);
        }
        FieldOp::NonTopoComplexPack4Bits => {
            non_topological(builder, reader, |r| Ok(r.read_bits(4)? as i32 - 7))?;
        }
        FieldOp::FieldPathEncodeFinish => {}
    }
    Ok(())
}

/// Writes field-path lists the decoder accepts.
///
/// Each path is reached from the previous one with a single operation, so
/// the decoder emits exactly the written sequence.
#[derive(Debug, Clone)]
pub struct FieldPathEncoder {
    current: Vec<i32>,
}

impl Default for FieldPathEncoder {
    fn default() -> Self {
        Self { current: vec![-1] }
    }
}

impl FieldPathEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the operation that moves the working path to `path`.
    pub fn write(&mut self, writer: &mut BitWriter, path: &[u16]) -> SchemaResult<()> {
        if path.is_empty() || path.len() > MAX_FIELD_PATH_DEPTH {
            return Err(SchemaError::FieldPathTooDeep {
                depth: MAX_FIELD_PATH_DEPTH,
            });
        }
        let target: Vec<i32> = path.iter().map(|e| i32::from(*e)).collect();
        let last = target.len() - 1;
        let same_prefix =
            target.len() == self.current.len() && target[..last] == self.current[..last];
        let delta = target[last] - self.current[last];

        if same_prefix && delta > 0 {
            match delta {
                1 => write_op(writer, FieldOp::PlusOne)?,
                2 => write_op(writer, FieldOp::PlusTwo)?,
                3 => write_op(writer, FieldOp::PlusThree)?,
                4 => write_op(writer, FieldOp::PlusFour)?,
                _ => {
                    write_op(writer, FieldOp::PlusN)?;
                    writer.write_ubit_var_fp((delta - 5) as u32);
                }
            }
        } else if target.len() >= self.current.len() {
            write_op(writer, FieldOp::PushNAndNonTopological)?;
            for (now, want) in self.current.iter().zip(&target) {
                let change = want - now;
                writer.write_bit(change != 0);
                if change != 0 {
                    writer.write_vars32(change - 1);
                }
            }
            let pushed = &target[self.current.len()..];
            writer.write_ubit_var(pushed.len() as u32);
            for value in pushed {
                writer.write_ubit_var_fp(*value as u32);
            }
        } else {
            write_op(writer, FieldOp::PopNAndNonTopographical)?;
            writer.write_ubit_var_fp((self.current.len() - target.len()) as u32);
            for (now, want) in self.current.iter().zip(&target) {
                let change = want - now;
                writer.write_bit(change != 0);
                if change != 0 {
                    writer.write_vars32(change);
                }
            }
        }
        self.current = target;
        Ok(())
    }

    /// Writes the finish code.
    pub fn finish(self, writer: &mut BitWriter) -> SchemaResult<()> {
        write_op(writer, FieldOp::FieldPathEncodeFinish)
    }
}

/// Writes the Huffman code of `op`.
pub fn write_op(writer: &mut BitWriter, op: FieldOp) -> SchemaResult<()> {
    let code = huffman::table().code(op);
    writer.write_bits(code.bits, code.len)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> SchemaResult<Vec<Vec<u16>>> {
        let mut reader = BitReader::new(bytes);
        FieldPathDecoder::new(&mut reader)
            .map(|p| p.map(|p| p.elements().to_vec()))
            .collect()
    }

    #[test]
    fn plus_one_then_finish() {
        let mut writer = BitWriter::new();
        write_op(&mut writer, FieldOp::PlusOne).unwrap();
        write_op(&mut writer, FieldOp::PlusOne).unwrap();
        write_op(&mut writer, FieldOp::FieldPathEncodeFinish).unwrap();
        let bytes = writer.finish();
        assert_eq!(decode_all(&bytes).unwrap(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn finish_only_yields_nothing() {
        // Finish is `1` then `0`.
        assert!(decode_all(&[0b01]).unwrap().is_empty());
    }

    #[test]
    fn reader_stops_after_finish_code() {
        let mut writer = BitWriter::new();
        write_op(&mut writer, FieldOp::PlusOne).unwrap();
        write_op(&mut writer, FieldOp::FieldPathEncodeFinish).unwrap();
        writer.write_bits(0x2A, 7).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        let mut paths = Vec::new();
        decode_field_paths(&mut reader, &mut paths).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(reader.bit_position(), 3);
        assert_eq!(reader.read_bits(7).unwrap(), 0x2A);
    }

    #[test]
    fn pack6_push() {
        let mut writer = BitWriter::new();
        write_op(&mut writer, FieldOp::PlusOne).unwrap();
        write_op(&mut writer, FieldOp::PushOneLeftDeltaNRightNonZeroPack6Bits).unwrap();
        writer.write_bits(1, 3).unwrap();
        writer.write_bits(4, 3).unwrap();
        write_op(&mut writer, FieldOp::PopAllButOnePlusOne).unwrap();
        write_op(&mut writer, FieldOp::FieldPathEncodeFinish).unwrap();
        let bytes = writer.finish();
        assert_eq!(
            decode_all(&bytes).unwrap(),
            vec![vec![0], vec![3, 5], vec![4]]
        );
    }

    #[test]
    fn pop_above_root_is_an_error() {
        let mut writer = BitWriter::new();
        write_op(&mut writer, FieldOp::PlusOne).unwrap();
        write_op(&mut writer, FieldOp::PopOnePlusOne).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let mut decoder = FieldPathDecoder::new(&mut reader);
        assert!(decoder.next().unwrap().is_ok());
        assert!(matches!(
            decoder.next(),
            Some(Err(SchemaError::FieldPathUnderflow { .. }))
        ));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut writer = BitWriter::new();
        write_op(&mut writer, FieldOp::PushOneLeftDeltaZeroRightZero).unwrap();
        let bytes = writer.finish();
        // Drop the last byte so the 12-bit code is cut short.
        assert!(decode_all(&bytes[..1]).is_err());
    }

    #[test]
    fn encoder_roundtrip_mixed_depths() {
        let paths: Vec<Vec<u16>> = vec![
            vec![0],
            vec![1],
            vec![7],
            vec![7, 0],
            vec![7, 3, 2],
            vec![9, 0, 0, 1],
            vec![2],
            vec![2, 40_000],
            vec![300],
        ];
        let mut writer = BitWriter::new();
        let mut encoder = FieldPathEncoder::new();
        for path in &paths {
            encoder.write(&mut writer, path).unwrap();
        }
        encoder.finish(&mut writer).unwrap();
        let bytes = writer.finish();
        assert_eq!(decode_all(&bytes).unwrap(), paths);
    }
}
