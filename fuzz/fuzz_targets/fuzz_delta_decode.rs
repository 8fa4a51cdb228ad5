//! Fuzz target for delta decoding.
//!
//! Decoding arbitrary encodings must return an error or points, never panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rescache_types::DeltaEncodedData;

#[derive(Debug, Arbitrary)]
struct Input {
    start_epoch: f64,
    start_volume: i64,
    time_multiplier: i64,
    epochs: Vec<f64>,
    volumes: Vec<i64>,
}

fuzz_target!(|input: Input| {
    let encoded = DeltaEncodedData {
        start_epoch: input.start_epoch,
        start_volume: input.start_volume,
        time_multiplier: input.time_multiplier,
        epochs: input.epochs,
        volumes: input.volumes,
    };

    if let Ok(points) = rescache_codec::decode(&encoded) {
        assert_eq!(points.len(), encoded.point_count());
    }
});
