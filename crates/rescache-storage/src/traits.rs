//! Storage backend traits.
//!
//! Defines the interface every block mirror backend implements, enabling
//! pluggable storage strategies.

use crate::{Result, StorageError};
use rescache_types::Block;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of upserting a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No block with this id existed.
    Inserted,
    /// An existing block was changed.
    Modified,
    /// An identical block was already stored.
    Unchanged,
}

/// Aggregated outcome of a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    /// Blocks that did not exist before.
    pub inserted: u64,
    /// Blocks whose stored content changed.
    pub modified: u64,
    /// Blocks replayed with identical content.
    pub unchanged: u64,
}

impl UpsertSummary {
    /// Records one upsert outcome.
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Modified => self.modified += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Total number of blocks processed.
    pub fn total(&self) -> u64 {
        self.inserted + self.modified + self.unchanged
    }
}

/// Trait for block mirror backends.
///
/// Implementations include in-memory and RocksDB storage. Blocks are keyed by
/// [`Block::id`]; upserts follow `$set` semantics, so fields present on the
/// incoming block overwrite stored ones and all other stored fields are kept.
pub trait BlockStore: Send + Sync {
    /// Establishes the connection to the backing store.
    fn connect(&self) -> Result<()>;

    /// Returns true between a successful `connect` and `close`.
    fn is_connected(&self) -> bool;

    /// Returns the highest stored block id.
    fn max_block_id(&self) -> Result<Option<u64>>;

    /// Inserts or updates a single block.
    fn upsert(&self, block: Block) -> Result<UpsertOutcome>;

    /// Bulk upsert, keyed by block id.
    fn upsert_blocks(&self, blocks: Vec<Block>) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for block in blocks {
            summary.record(self.upsert(block)?);
        }
        Ok(summary)
    }

    /// Retrieves a block by id.
    fn get_block(&self, id: u64) -> Result<Option<Block>>;

    /// Returns the stored blocks with `start <= id <= end`, ascending.
    fn blocks_in_range(&self, start: u64, end: u64) -> Result<Vec<Block>>;

    /// Returns every stored block, ascending.
    fn all_blocks(&self) -> Result<Vec<Block>> {
        self.blocks_in_range(0, u64::MAX)
    }

    /// Returns the number of stored blocks.
    fn len(&self) -> Result<usize>;

    /// Returns true if the store is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush any pending writes to durable storage.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases the connection. Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Returns storage statistics.
    fn stats(&self) -> StorageStats {
        StorageStats::default()
    }
}

impl<T: BlockStore + ?Sized> BlockStore for Arc<T> {
    fn connect(&self) -> Result<()> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn max_block_id(&self) -> Result<Option<u64>> {
        (**self).max_block_id()
    }

    fn upsert(&self, block: Block) -> Result<UpsertOutcome> {
        (**self).upsert(block)
    }

    fn upsert_blocks(&self, blocks: Vec<Block>) -> Result<UpsertSummary> {
        (**self).upsert_blocks(blocks)
    }

    fn get_block(&self, id: u64) -> Result<Option<Block>> {
        (**self).get_block(id)
    }

    fn blocks_in_range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
        (**self).blocks_in_range(start, end)
    }

    fn all_blocks(&self) -> Result<Vec<Block>> {
        (**self).all_blocks()
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn stats(&self) -> StorageStats {
        (**self).stats()
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    /// Total number of blocks.
    pub block_count: u64,
    /// Number of read operations.
    pub reads: u64,
    /// Number of write operations.
    pub writes: u64,
}

/// Applies `incoming` on top of `existing` with `$set` semantics.
///
/// Returns the merged block and whether it differs from `existing`.
pub fn apply_set(existing: &Block, incoming: Block) -> Result<(Block, UpsertOutcome)> {
    let Value::Object(mut merged) = serde_json::to_value(existing)? else {
        return Err(StorageError::Corruption(format!(
            "block {} is not a document",
            existing.id
        )));
    };
    let Value::Object(fields) = serde_json::to_value(incoming)? else {
        return Err(StorageError::Corruption(
            "incoming block is not a document".to_string(),
        ));
    };
    merged.extend(fields);

    let merged: Block = serde_json::from_value(Value::Object(merged))?;
    let outcome = if merged == *existing {
        UpsertOutcome::Unchanged
    } else {
        UpsertOutcome::Modified
    };
    Ok((merged, outcome))
}
