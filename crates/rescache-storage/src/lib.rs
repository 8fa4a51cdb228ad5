//! Block mirror storage for rescache.
//!
//! This crate provides the [`BlockStore`] abstraction the sync engine writes
//! into, with an in-memory backend and an optional RocksDB backend. Blocks are
//! keyed by id and upserted, so replaying a range is always safe.

mod error;
mod traits;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "rocksdb-backend")]
mod rocksdb;

pub use error::{Result, StorageError};
pub use traits::{apply_set, BlockStore, StorageStats, UpsertOutcome, UpsertSummary};

#[cfg(feature = "memory")]
pub use memory::MemoryBlockStore;

#[cfg(feature = "rocksdb-backend")]
pub use crate::rocksdb::{RocksDbBlockStore, RocksDbConfig};
