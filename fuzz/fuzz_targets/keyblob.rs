#![no_main]

use dotsign::StrongNameKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(key) = StrongNameKey::from_blob(data) {
        let _ = key.public_key_token();
    }
});
