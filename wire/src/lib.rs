//! Envelope framing and message containers for Source 2 demo streams.
//!
//! This crate turns raw bytes into [`RawPacket`]s, names the outer demo
//! commands and inner message kinds, declares the protobuf envelopes the
//! decoder relies on, and defines the [`Stage`] trait the pipeline is built
//! from. It does not know about entities or field decoding.
//!
//! # Design Principles
//!
//! - **Chunk independence** - Packet output never depends on how input bytes were split.
//! - **Bounded decoding** - Every length prefix is validated against [`Limits`] before buffering.
//! - **Closed catalogs** - Commands and message kinds are enums with an explicit unknown variant.

mod error;
mod extractor;
mod header;
mod limits;
mod message;
mod packet;
pub mod proto;
mod stage;

pub use error::{LimitKind, WireError, WireResult};
pub use extractor::PacketExtractor;
pub use header::{DemoHeader, HEADER_SIZE, MAGIC};
pub use limits::Limits;
pub use message::{encode_message, messages, InnerMessage, MessageKind, Messages};
pub use packet::{decompress, encode_frame, DemoCommand, DemoSource, RawPacket, COMPRESSED_FLAG};
pub use stage::{Chain, Stage};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = MAGIC;
        let _ = HEADER_SIZE;
        let _ = Limits::default();
        let _ = DemoCommand::from_id(7);
        let _ = MessageKind::from_id(55);
        let _ = PacketExtractor::new(DemoSource::Broadcast, Limits::default());

        let _: WireResult<()> = Ok(());
    }

    #[test]
    fn extractor_runs_as_a_stage() {
        let mut bytes = DemoHeader::default().encode().to_vec();
        encode_frame(&mut bytes, DemoSource::Replay, DemoCommand::Stop, false, 0, &[]);

        let mut stage = PacketExtractor::new(DemoSource::Replay, Limits::default());
        let out = stage.process(bytes.as_slice()).unwrap();
        assert_eq!(out.len(), 1);
        assert!(stage.finalize().unwrap().is_empty());
    }
}
