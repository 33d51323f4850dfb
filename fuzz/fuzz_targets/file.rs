#![no_main]

use dotsign::{strongname::hashable_ranges, File};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(file) = File::from_mem(data.to_vec()) {
        if let Ok(metadata) = file.signing_metadata() {
            let _ = hashable_ranges(&metadata);
        }
    }
});
