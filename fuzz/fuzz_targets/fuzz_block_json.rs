//! Fuzz target for ledger block pages.
//!
//! Parses arbitrary JSON as a page of blocks, normalizes transaction values
//! and encodes the volume series.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rescache_types::Block;

fuzz_target!(|data: &[u8]| {
    let Ok(blocks) = serde_json::from_slice::<Vec<Block>>(data) else {
        return;
    };

    let blocks: Vec<Block> = blocks.into_iter().map(Block::normalize_values).collect();
    let series = rescache_codec::series_from_blocks(&blocks);
    let encoded = rescache_codec::encode(&series);

    if !series.is_empty() {
        assert_eq!(encoded.point_count(), series.len());
    }
});
