use bitstream::{varint, BitReader, BitWriter};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Bit(bool),
    Bits { bits: u8, value: u32 },
    Align,
    U64(u64),
    VarU32(u32),
    VarS32(i32),
    VarU64(u64),
    UBitVar(u32),
    UBitVarFp(u32),
    Float(f32),
    Str(String),
}

fn mask_value(bits: u8, value: u32) -> u32 {
    if bits >= 32 {
        value
    } else {
        value & ((1u32 << bits) - 1)
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Bit),
        (1u8..=32, any::<u32>()).prop_map(|(bits, value)| Op::Bits {
            bits,
            value: mask_value(bits, value),
        }),
        Just(Op::Align),
        any::<u64>().prop_map(Op::U64),
        any::<u32>().prop_map(Op::VarU32),
        any::<i32>().prop_map(Op::VarS32),
        any::<u64>().prop_map(Op::VarU64),
        any::<u32>().prop_map(Op::UBitVar),
        (0u32..0x8000_0000).prop_map(Op::UBitVarFp),
        any::<f32>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Op::Float),
        "[a-zA-Z0-9_.]{0,24}".prop_map(Op::Str),
    ]
}

proptest! {
    #[test]
    fn prop_roundtrip_ops(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut writer = BitWriter::new();

        for op in &ops {
            match op {
                Op::Bit(b) => writer.write_bit(*b),
                Op::Bits { bits, value } => writer.write_bits(*value, *bits).unwrap(),
                Op::Align => writer.align_to_byte(),
                Op::U64(v) => writer.write_u64_bits(*v),
                Op::VarU32(v) => writer.write_varu32(*v),
                Op::VarS32(v) => writer.write_vars32(*v),
                Op::VarU64(v) => writer.write_varu64(*v),
                Op::UBitVar(v) => writer.write_ubit_var(*v),
                Op::UBitVarFp(v) => writer.write_ubit_var_fp(*v),
                Op::Float(v) => writer.write_f32(*v),
                Op::Str(s) => writer.write_cstring(s),
            }
        }

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        for op in &ops {
            match op {
                Op::Bit(b) => prop_assert_eq!(reader.read_bit().unwrap(), *b),
                Op::Bits { bits, value } => {
                    prop_assert_eq!(reader.read_bits(*bits).unwrap(), *value);
                }
                Op::Align => reader.align_to_byte().unwrap(),
                Op::U64(v) => prop_assert_eq!(reader.read_u64_bits().unwrap(), *v),
                Op::VarU32(v) => prop_assert_eq!(reader.read_varu32().unwrap(), *v),
                Op::VarS32(v) => prop_assert_eq!(reader.read_vars32().unwrap(), *v),
                Op::VarU64(v) => prop_assert_eq!(reader.read_varu64().unwrap(), *v),
                Op::UBitVar(v) => prop_assert_eq!(reader.read_ubit_var().unwrap(), *v),
                Op::UBitVarFp(v) => prop_assert_eq!(reader.read_ubit_var_fp().unwrap(), *v),
                Op::Float(v) => prop_assert_eq!(reader.read_f32().unwrap().to_bits(), v.to_bits()),
                Op::Str(s) => prop_assert_eq!(&reader.read_cstring(64).unwrap(), s),
            }
        }
    }

    #[test]
    fn prop_byte_varint_roundtrip(value in any::<u32>()) {
        let mut out = Vec::new();
        let written = varint::encode_u32(value, &mut out);
        prop_assert!(written <= varint::MAX_VARINT32_BYTES);
        prop_assert_eq!(written, varint::encoded_len(value));
        prop_assert_eq!(varint::decode_u32(&out).unwrap(), Some((value, written)));
    }

    #[test]
    fn prop_byte_varint_truncated_is_incomplete(value in 128u32..) {
        let mut out = Vec::new();
        let written = varint::encode_u32(value, &mut out);
        for cut in 0..written {
            prop_assert_eq!(varint::decode_u32(&out[..cut]).unwrap(), None);
        }
    }
}
