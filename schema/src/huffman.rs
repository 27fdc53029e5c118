//! The fixed Huffman code over field-path operations.
//!
//! The tree is rebuilt from a fixed weight table once per process and turned
//! into a flat lookup table indexed by the next [`MAX_CODE_BITS`] bits of
//! input (least significant bit first).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::OnceLock;

/// Length of the longest code in the tree.
pub const MAX_CODE_BITS: u8 = 17;

/// Field-path operations in code order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldOp {
    PlusOne,
    PlusTwo,
    PlusThree,
    PlusFour,
    PlusN,
    PushOneLeftDeltaZeroRightZero,
    PushOneLeftDeltaZeroRightNonZero,
    PushOneLeftDeltaOneRightZero,
    PushOneLeftDeltaOneRightNonZero,
    PushOneLeftDeltaNRightZero,
    PushOneLeftDeltaNRightNonZero,
    PushOneLeftDeltaNRightNonZeroPack6Bits,
    PushOneLeftDeltaNRightNonZeroPack8Bits,
    PushTwoLeftDeltaZero,
    PushTwoPack5LeftDeltaZero,
    PushThreeLeftDeltaZero,
    PushThreePack5LeftDeltaZero,
    PushTwoLeftDeltaOne,
    PushTwoPack5LeftDeltaOne,
    PushThreeLeftDeltaOne,
    PushThreePack5LeftDeltaOne,
    PushTwoLeftDeltaN,
    PushTwoPack5LeftDeltaN,
    PushThreeLeftDeltaN,
    PushThreePack5LeftDeltaN,
    PushN,
    PushNAndNonTopological,
    PopOnePlusOne,
    PopOnePlusN,
    PopAllButOnePlusOne,
    PopAllButOnePlusN,
    PopAllButOnePlusNPack3Bits,
    PopAllButOnePlusNPack6Bits,
    PopNPlusOne,
    PopNPlusN,
    PopNAndNonTopographical,
    NonTopoComplex,
    NonTopoPenultimatePlusOne,
    NonTopoComplexPack4Bits,
    FieldPathEncodeFinish,
}

/// Number of field-path operations.
pub const OP_COUNT: usize = 40;

impl FieldOp {
    /// All operations, indexed by their code-order position.
    pub const ALL: [Self; OP_COUNT] = [
        Self::PlusOne,
        Self::PlusTwo,
        Self::PlusThree,
        Self::PlusFour,
        Self::PlusN,
        Self::PushOneLeftDeltaZeroRightZero,
        Self::PushOneLeftDeltaZeroRightNonZero,
        Self::PushOneLeftDeltaOneRightZero,
        Self::PushOneLeftDeltaOneRightNonZero,
        Self::PushOneLeftDeltaNRightZero,
        Self::PushOneLeftDeltaNRightNonZero,
        Self::PushOneLeftDeltaNRightNonZeroPack6Bits,
        Self::PushOneLeftDeltaNRightNonZeroPack8Bits,
        Self::PushTwoLeftDeltaZero,
        Self::PushTwoPack5LeftDeltaZero,
        Self::PushThreeLeftDeltaZero,
        Self::PushThreePack5LeftDeltaZero,
        Self::PushTwoLeftDeltaOne,
        Self::PushTwoPack5LeftDeltaOne,
        Self::PushThreeLeftDeltaOne,
        Self::PushThreePack5LeftDeltaOne,
        Self::PushTwoLeftDeltaN,
        Self::PushTwoPack5LeftDeltaN,
        Self::PushThreeLeftDeltaN,
        Self::PushThreePack5LeftDeltaN,
        Self::PushN,
        Self::PushNAndNonTopological,
        Self::PopOnePlusOne,
        Self::PopOnePlusN,
        Self::PopAllButOnePlusOne,
        Self::PopAllButOnePlusN,
        Self::PopAllButOnePlusNPack3Bits,
        Self::PopAllButOnePlusNPack6Bits,
        Self::PopNPlusOne,
        Self::PopNPlusN,
        Self::PopNAndNonTopographical,
        Self::NonTopoComplex,
        Self::NonTopoPenultimatePlusOne,
        Self::NonTopoComplexPack4Bits,
        Self::FieldPathEncodeFinish,
    ];

    /// Observed frequencies the code was generated from.
    const WEIGHTS: [u32; OP_COUNT] = [
        36271, 10334, 1375, 646, 4128, 35, 3, 521, 2942, 560, 471, 10530, 251, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 0, 310, 2, 0, 1837, 149, 300, 634, 0, 0, 1, 76, 271, 99, 25474,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PlusOne => "PlusOne",
            Self::PlusTwo => "PlusTwo",
            Self::PlusThree => "PlusThree",
            Self::PlusFour => "PlusFour",
            Self::PlusN => "PlusN",
            Self::PushOneLeftDeltaZeroRightZero => "PushOneLeftDeltaZeroRightZero",
            Self::PushOneLeftDeltaZeroRightNonZero => "PushOneLeftDeltaZeroRightNonZero",
            Self::PushOneLeftDeltaOneRightZero => "PushOneLeftDeltaOneRightZero",
            Self::PushOneLeftDeltaOneRightNonZero => "PushOneLeftDeltaOneRightNonZero",
            Self::PushOneLeftDeltaNRightZero => "PushOneLeftDeltaNRightZero",
            Self::PushOneLeftDeltaNRightNonZero => "PushOneLeftDeltaNRightNonZero",
            Self::PushOneLeftDeltaNRightNonZeroPack6Bits => "PushOneLeftDeltaNRightNonZeroPack6Bits",
            Self::PushOneLeftDeltaNRightNonZeroPack8Bits => "PushOneLeftDeltaNRightNonZeroPack8Bits",
            Self::PushTwoLeftDeltaZero => "PushTwoLeftDeltaZero",
            Self::PushTwoPack5LeftDeltaZero => "PushTwoPack5LeftDeltaZero",
            Self::PushThreeLeftDeltaZero => "PushThreeLeftDeltaZero",
            Self::PushThreePack5LeftDeltaZero => "PushThreePack5LeftDeltaZero",
            Self::PushTwoLeftDeltaOne => "PushTwoLeftDeltaOne",
            Self::PushTwoPack5LeftDeltaOne => "PushTwoPack5LeftDeltaOne",
            Self::PushThreeLeftDeltaOne => "PushThreeLeftDeltaOne",
            Self::PushThreePack5LeftDeltaOne => "PushThreePack5LeftDeltaOne",
            Self::PushTwoLeftDeltaN => "PushTwoLeftDeltaN",
            Self::PushTwoPack5LeftDeltaN => "PushTwoPack5LeftDeltaN",
            Self::PushThreeLeftDeltaN => "PushThreeLeftDeltaN",
            Self::PushThreePack5LeftDeltaN => "PushThreePack5LeftDeltaN",
            Self::PushN => "PushN",
            Self::PushNAndNonTopological => "PushNAndNonTopological",
            Self::PopOnePlusOne => "PopOnePlusOne",
            Self::PopOnePlusN => "PopOnePlusN",
            Self::PopAllButOnePlusOne => "PopAllButOnePlusOne",
            Self::PopAllButOnePlusN => "PopAllButOnePlusN",
            Self::PopAllButOnePlusNPack3Bits => "PopAllButOnePlusNPack3Bits",
            Self::PopAllButOnePlusNPack6Bits => "PopAllButOnePlusNPack6Bits",
            Self::PopNPlusOne => "PopNPlusOne",
            Self::PopNPlusN => "PopNPlusN",
            Self::PopNAndNonTopographical => "PopNAndNonTopographical",
            Self::NonTopoComplex => "NonTopoComplex",
            Self::NonTopoPenultimatePlusOne => "NonTopoPenultimatePlusOne",
            Self::NonTopoComplexPack4Bits => "NonTopoComplexPack4Bits",
            Self::FieldPathEncodeFinish => "FieldPathEncodeFinish",
        }
    }
}

/// A code: `bits` holds the branch decisions, first decision in bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code {
    pub bits: u32,
    pub len: u8,
}

/// Codes per operation plus the flat decode table.
#[derive(Debug)]
pub struct HuffmanTable {
    codes: [Code; OP_COUNT],
    /// `(op index, code length)` for every possible `MAX_CODE_BITS` window.
    lookup: Box<[(u8, u8)]>,
}

enum Node {
    Leaf(u8),
    Branch(usize, usize),
}

impl HuffmanTable {
    fn build() -> Self {
        // Max-heap on (lowest weight, then highest value).
        let mut heap: BinaryHeap<(Reverse<u32>, usize)> = BinaryHeap::new();
        let mut nodes: Vec<Node> = Vec::with_capacity(OP_COUNT * 2);
        for (index, weight) in FieldOp::WEIGHTS.iter().enumerate() {
            nodes.push(Node::Leaf(index as u8));
            heap.push((Reverse((*weight).max(1)), index));
        }
        while heap.len() > 1 {
            let (Some((Reverse(w1), left)), Some((Reverse(w2), right))) = (heap.pop(), heap.pop())
            else {
                break;
            };
            let value = nodes.len();
            nodes.push(Node::Branch(left, right));
            heap.push((Reverse(w1 + w2), value));
        }
        let root = heap.pop().map_or(0, |(_, value)| value);

        let mut codes = [Code { bits: 0, len: 0 }; OP_COUNT];
        let mut stack = vec![(root, 0u32, 0u8)];
        while let Some((node, bits, len)) = stack.pop() {
            match nodes[node] {
                Node::Leaf(op) => codes[op as usize] = Code { bits, len },
                Node::Branch(left, right) => {
                    stack.push((left, bits, len + 1));
                    stack.push((right, bits | (1 << len), len + 1));
                }
            }
        }

        let mut lookup = vec![(0u8, 0u8); 1 << MAX_CODE_BITS].into_boxed_slice();
        for (op, code) in codes.iter().enumerate() {
            let free = MAX_CODE_BITS - code.len;
            for suffix in 0..(1u32 << free) {
                lookup[(code.bits | (suffix << code.len)) as usize] = (op as u8, code.len);
            }
        }

        Self { codes, lookup }
    }

    /// Returns the code for `op`.
    #[must_use]
    pub const fn code(&self, op: FieldOp) -> Code {
        self.codes[op.index()]
    }

    /// Decodes the operation at the front of `window`.
    ///
    /// `window` holds up to [`MAX_CODE_BITS`] upcoming bits with unread bits
    /// zeroed. Returns the operation and how many bits its code used.
    #[must_use]
    pub fn lookup(&self, window: u32) -> (FieldOp, u8) {
        let (op, len) = self.lookup[(window & ((1 << MAX_CODE_BITS) - 1)) as usize];
        (FieldOp::ALL[op as usize], len)
    }
}

/// The process-wide table, built on first use.
pub fn table() -> &'static HuffmanTable {
    static TABLE: OnceLock<HuffmanTable> = OnceLock::new();
    TABLE.get_or_init(HuffmanTable::build)
}
