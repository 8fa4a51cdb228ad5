//! In-memory block store.

use crate::traits::{apply_set, BlockStore, StorageStats, UpsertOutcome, UpsertSummary};
use crate::{Result, StorageError};
use parking_lot::RwLock;
use rescache_types::Block;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Block store backed by an ordered in-memory map.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    /// Blocks indexed by id.
    blocks: RwLock<BTreeMap<u64, Block>>,
    connected: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryBlockStore {
    /// Creates a new, disconnected, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connected store pre-populated with `blocks`.
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let store = Self::new();
        store.blocks.write().extend(blocks.into_iter().map(|b| (b.id, b)));
        store.connected.store(true, Ordering::SeqCst);
        store
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::NotConnected)
        }
    }

    fn upsert_locked(blocks: &mut BTreeMap<u64, Block>, block: Block) -> Result<UpsertOutcome> {
        match blocks.get(&block.id) {
            None => {
                blocks.insert(block.id, block);
                Ok(UpsertOutcome::Inserted)
            }
            Some(existing) => {
                let (merged, outcome) = apply_set(existing, block)?;
                if outcome == UpsertOutcome::Modified {
                    blocks.insert(merged.id, merged);
                }
                Ok(outcome)
            }
        }
    }
}

impl BlockStore for MemoryBlockStore {
    fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn max_block_id(&self) -> Result<Option<u64>> {
        self.ensure_connected()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.blocks.read().keys().next_back().copied())
    }

    fn upsert(&self, block: Block) -> Result<UpsertOutcome> {
        self.ensure_connected()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Self::upsert_locked(&mut self.blocks.write(), block)
    }

    fn upsert_blocks(&self, blocks: Vec<Block>) -> Result<UpsertSummary> {
        self.ensure_connected()?;
        let mut summary = UpsertSummary::default();
        let mut stored = self.blocks.write();
        for block in blocks {
            summary.record(Self::upsert_locked(&mut stored, block)?);
        }
        self.writes.fetch_add(summary.total(), Ordering::Relaxed);
        Ok(summary)
    }

    fn get_block(&self, id: u64) -> Result<Option<Block>> {
        self.ensure_connected()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.blocks.read().get(&id).cloned())
    }

    fn blocks_in_range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
        self.ensure_connected()?;
        if start > end {
            return Ok(Vec::new());
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.blocks.read().range(start..=end).map(|(_, b)| b.clone()).collect())
    }

    fn len(&self) -> Result<usize> {
        self.ensure_connected()?;
        Ok(self.blocks.read().len())
    }

    fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        StorageStats {
            block_count: self.blocks.read().len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}
