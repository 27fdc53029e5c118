#![no_main]

use libfuzzer_sys::fuzz_target;
use wire::{messages, DemoSource, Limits, PacketExtractor};

fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let source = if first & 1 == 0 {
        DemoSource::Replay
    } else {
        DemoSource::Broadcast
    };
    let limits = Limits::for_testing();
    let chunk = usize::from(first >> 1).max(1);

    // Chunking must not change what the extractor cuts.
    let mut whole = PacketExtractor::new(source, limits.clone());
    let expected = whole.push(rest);
    let mut split = PacketExtractor::new(source, limits.clone());
    let mut packets = Vec::new();
    let mut failed = false;
    for piece in rest.chunks(chunk) {
        match split.push(piece) {
            Ok(out) => packets.extend(out),
            Err(_) => {
                failed = true;
                break;
            }
        }
    }
    if let Ok(expected) = expected {
        if !failed {
            assert_eq!(expected, packets);
            assert_eq!(whole.finish(), split.finish());
        }
    }

    for packet in &packets {
        if let Ok(payload) = packet.decompressed() {
            for message in messages(&payload, &limits) {
                if message.is_err() {
                    break;
                }
            }
        }
    }
});
