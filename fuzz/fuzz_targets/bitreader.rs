#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Use input bytes to drive a bounded sequence of operations.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 10;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bit();
            }
            1 => {
                let bits = data[idx.saturating_sub(1)] % 33;
                let _ = reader.read_bits(bits);
            }
            2 => {
                let _ = reader.align_to_byte();
            }
            3 => {
                let _ = reader.read_ubit_var();
            }
            4 => {
                let _ = reader.read_ubit_var_fp();
            }
            5 => {
                let _ = reader.read_varu64();
            }
            6 => {
                let _ = reader.read_bit_coord();
            }
            7 => {
                let _ = reader.read_cstring(64);
            }
            8 => {
                let back = usize::from(data[idx.saturating_sub(1)] % 16);
                let _ = reader.move_back(back);
            }
            _ => {
                let _ = reader.read_vars32();
            }
        }
    }
});
