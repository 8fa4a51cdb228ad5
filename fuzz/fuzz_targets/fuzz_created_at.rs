#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Some(epoch) = rescache_codec::parse_created_at(s) {
            let _ = rescache_codec::format_epoch_micros(epoch);
        }
    }
});
