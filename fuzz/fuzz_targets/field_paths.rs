#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;
use schema::{decode_field_paths, MAX_FIELD_PATH_DEPTH};

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut paths = Vec::new();
    if decode_field_paths(&mut reader, &mut paths).is_ok() {
        for path in &paths {
            assert!(path.len() <= MAX_FIELD_PATH_DEPTH);
        }
    }
});
