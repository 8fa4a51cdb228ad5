//! Fuzz target for live channel messages.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let message = rescache_sync::LiveMessage::parse(&text);
    let _ = message.is_update();
});
