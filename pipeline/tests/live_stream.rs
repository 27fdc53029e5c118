//! Broadcast chunks fed as they arrive: a heavy packet is applied once its
//! batch has waited `batch_wait`, without more input or `finish`.

use std::thread;
use std::time::{Duration, Instant};

use bitstream::BitWriter;
use pipeline::{Parser, PipelineConfig};
use prost::Message as _;
use wire::proto::{CDemoPacket, CnetMsgTick};
use wire::{encode_frame, encode_message, DemoCommand, DemoSource, MessageKind};

fn tick_frame(tick: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    encode_message(&mut w, MessageKind::NetTick, &CnetMsgTick { tick }.encode_to_vec());
    let packet = CDemoPacket { data: w.finish() };
    let mut out = Vec::new();
    encode_frame(
        &mut out,
        DemoSource::Broadcast,
        DemoCommand::Packet,
        false,
        tick,
        &packet.encode_to_vec(),
    );
    out
}

fn live(workers: usize, batch_wait: Duration) -> Parser {
    let config = PipelineConfig {
        worker_threads: workers,
        batch_bytes: 1 << 20,
        batch_wait,
        ..PipelineConfig::for_testing()
    };
    let mut parser = Parser::new(config).unwrap();
    parser.begin(DemoSource::Broadcast).unwrap();
    parser
}

/// Polls like an idle live source until `tick` is applied or time runs out.
fn wait_for_tick(parser: &mut Parser, tick: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        parser.poll().unwrap();
        if parser.demo().tick() == tick {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn aged_batches_apply_between_chunks() {
    for workers in [0, 2] {
        let mut parser = live(workers, Duration::from_millis(5));
        parser.feed(&tick_frame(77)).unwrap();
        assert!(wait_for_tick(&mut parser, 77), "workers={workers}");

        parser.feed(&tick_frame(78)).unwrap();
        assert!(wait_for_tick(&mut parser, 78), "workers={workers}");

        parser.finish().unwrap();
        assert_eq!(parser.demo().tick(), 78);
        assert_eq!(parser.stats().packets.raw_packets, 2);
    }
}

#[test]
fn empty_chunks_still_flush_aged_batches() {
    let mut parser = live(0, Duration::from_millis(5));
    parser.feed(&tick_frame(12)).unwrap();
    thread::sleep(Duration::from_millis(50));
    parser.feed(&[]).unwrap();
    assert_eq!(parser.demo().tick(), 12);
    parser.finish().unwrap();
}

#[test]
fn young_batches_wait_for_more_input() {
    let mut parser = live(0, Duration::from_secs(60));
    parser.feed(&tick_frame(5)).unwrap();
    parser.poll().unwrap();
    assert_eq!(parser.demo().tick(), 0);

    parser.finish().unwrap();
    assert_eq!(parser.demo().tick(), 5);
}
