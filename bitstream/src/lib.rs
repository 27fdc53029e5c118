//! Low-level bit packing primitives for Source 2 demo decoding.
//!
//! This crate provides [`BitReader`] and [`BitWriter`] for LSB-first bit-level
//! decoding and encoding, plus the byte-level [`varint`] helpers used by
//! envelope framing.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked.
//! - **No domain knowledge** - This crate knows nothing about entities, packets, or tables.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bit(true);
//! writer.write_bits(42, 7).unwrap();
//! writer.write_ubit_var(300);
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_bit().unwrap(), true);
//! assert_eq!(reader.read_bits(7).unwrap(), 42);
//! assert_eq!(reader.read_ubit_var().unwrap(), 300);
//! ```

mod error;
mod reader;
pub mod varint;
mod writer;

pub use error::{BitError, BitResult};
pub use reader::BitReader;
pub use writer::BitWriter;
