//! Extraction of `(epoch, volume)` series from mirrored blocks.

use crate::delta::encode;
use crate::timestamp::parse_created_at;
use rescache_types::{Block, DeltaEncodedData, TimeSeriesPoint};

/// Builds the transaction-volume series of `blocks`.
///
/// The epoch comes from `createdAtEpoch` when the ledger supplied it, and is
/// otherwise parsed from `createdAt`. Blocks without a usable timestamp are
/// skipped. The result is sorted by epoch.
pub fn series_from_blocks(blocks: &[Block]) -> Vec<TimeSeriesPoint> {
    let mut series: Vec<TimeSeriesPoint> = blocks
        .iter()
        .filter_map(|block| {
            let epoch = block
                .created_at_epoch()
                .or_else(|| parse_created_at(&block.created_at));
            match epoch {
                Some(epoch) => Some(TimeSeriesPoint::new(epoch, block.volume() as i64)),
                None => {
                    tracing::warn!(
                        block_id = block.id,
                        created_at = %block.created_at,
                        "Skipping block with unparseable timestamp"
                    );
                    None
                }
            }
        })
        .collect();

    series.sort_by_key(|point| point.epoch);
    series
}

/// Delta-encodes the transaction-volume series of `blocks`.
pub fn encode_blocks(blocks: &[Block]) -> DeltaEncodedData {
    encode(&series_from_blocks(blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescache_types::Transaction;

    fn block(id: u64, created_at: &str, transactions: usize) -> Block {
        (0..transactions).fold(Block::new(id, created_at), |block, i| {
            block.with_transaction(Transaction::text("SET", format!("k{i}"), "v"))
        })
    }

    #[test]
    fn test_series_uses_transaction_count() {
        let blocks = vec![
            block(1, "1970-01-01T00:00:01Z", 5),
            block(2, "1970-01-01T00:00:02Z", 8),
        ];
        assert_eq!(
            series_from_blocks(&blocks),
            vec![
                TimeSeriesPoint::new(1_000_000, 5),
                TimeSeriesPoint::new(2_000_000, 8)
            ]
        );
    }

    #[test]
    fn test_series_prefers_epoch_field() {
        let mut b = block(1, "not a date", 2);
        b.extra
            .insert("createdAtEpoch".to_string(), serde_json::json!(2_500_000));
        assert_eq!(
            series_from_blocks(&[b]),
            vec![TimeSeriesPoint::new(2_500_000, 2)]
        );
    }

    #[test]
    fn test_series_skips_unparseable_and_sorts() {
        let blocks = vec![
            block(3, "1970-01-01T00:00:03Z", 1),
            block(2, "garbage", 4),
            block(1, "1970-01-01T00:00:01Z", 2),
        ];
        let series = series_from_blocks(&blocks);
        assert_eq!(
            series,
            vec![
                TimeSeriesPoint::new(1_000_000, 2),
                TimeSeriesPoint::new(3_000_000, 1)
            ]
        );
    }

    #[test]
    fn test_encode_blocks() {
        let blocks = vec![
            block(1, "1970-01-01T00:00:01Z", 5),
            block(2, "1970-01-01T00:00:02Z", 8),
            block(3, "1970-01-01T00:00:02.500Z", 3),
        ];
        let encoded = encode_blocks(&blocks);
        assert_eq!(encoded.epochs, vec![1.0, 0.5]);
        assert_eq!(encoded.volumes, vec![3, -5]);
    }

    #[test]
    fn test_encode_no_blocks() {
        assert_eq!(encode_blocks(&[]), DeltaEncodedData::empty());
    }
}
