//! RocksDB persistent block store.
//!
//! Blocks are stored as JSON documents in the `blocks` column family under
//! big-endian `u64` keys, so key order matches block order and the last key
//! is the highest block id.

use crate::traits::{apply_set, BlockStore, StorageStats, UpsertOutcome, UpsertSummary};
use crate::{Result, StorageError};
use parking_lot::{Mutex, RwLock};
use rescache_types::Block;
use rocksdb::{
    BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// RocksDB storage configuration.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Write buffer size in bytes.
    pub write_buffer_size: usize,

    /// Number of background compaction threads.
    pub background_jobs: i32,

    /// Enable LZ4 compression.
    pub compression_enabled: bool,

    /// Bloom filter bits per key (0 to disable).
    pub bloom_filter_bits: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/blocks"),
            write_buffer_size: 32 * 1024 * 1024, // 32 MB
            background_jobs: 2,
            compression_enabled: true,
            bloom_filter_bits: 10,
        }
    }
}

/// Column family holding block documents.
const CF_BLOCKS: &str = "blocks";

/// RocksDB persistent block store.
///
/// The database is opened by [`BlockStore::connect`] and released by
/// [`BlockStore::close`].
pub struct RocksDbBlockStore {
    config: RocksDbConfig,
    db: RwLock<Option<DB>>,
    /// Serializes read-modify-write upserts.
    write_lock: Mutex<()>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl std::fmt::Debug for RocksDbBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbBlockStore")
            .field("path", &self.config.path)
            .field("connected", &self.db.read().is_some())
            .finish()
    }
}

fn backend_err(e: rocksdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_key(raw: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StorageError::Corruption(format!("invalid key length {}", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

fn blocks_cf(db: &DB) -> Result<&ColumnFamily> {
    db.cf_handle(CF_BLOCKS)
        .ok_or_else(|| StorageError::Corruption("missing blocks column family".to_string()))
}

impl RocksDbBlockStore {
    /// Creates a store for the given configuration. Nothing is opened yet.
    pub fn new(config: RocksDbConfig) -> Self {
        Self {
            config,
            db: RwLock::new(None),
            write_lock: Mutex::new(()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Creates a store at `path` with default tuning.
    pub fn at_path<P: AsRef<Path>>(path: P) -> Self {
        Self::new(RocksDbConfig {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    fn open_db(config: &RocksDbConfig) -> Result<DB> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.increase_parallelism(config.background_jobs);
        opts.set_max_background_jobs(config.background_jobs);

        if config.compression_enabled {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let mut block_opts = BlockBasedOptions::default();
        if config.bloom_filter_bits > 0 {
            block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        }
        opts.set_block_based_table_factory(&block_opts);

        let cfs = vec![ColumnFamilyDescriptor::new(CF_BLOCKS, opts.clone())];
        DB::open_cf_descriptors(&opts, &config.path, cfs).map_err(backend_err)
    }

    fn with_db<T>(&self, f: impl FnOnce(&DB) -> Result<T>) -> Result<T> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotConnected)?;
        f(db)
    }

    fn read_block(db: &DB, id: u64) -> Result<Option<Block>> {
        match db.get_cf(blocks_cf(db)?, key(id)).map_err(backend_err)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

impl BlockStore for RocksDbBlockStore {
    fn connect(&self) -> Result<()> {
        let mut guard = self.db.write();
        if guard.is_none() {
            let db = Self::open_db(&self.config)?;
            tracing::info!(path = %self.config.path.display(), "Opened RocksDB block store");
            *guard = Some(db);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.db.read().is_some()
    }

    fn max_block_id(&self) -> Result<Option<u64>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.with_db(|db| {
            match db.iterator_cf(blocks_cf(db)?, IteratorMode::End).next() {
                Some(entry) => {
                    let (k, _) = entry.map_err(backend_err)?;
                    Ok(Some(decode_key(&k)?))
                }
                None => Ok(None),
            }
        })
    }

    fn upsert(&self, block: Block) -> Result<UpsertOutcome> {
        let summary = self.upsert_blocks(vec![block])?;
        Ok(if summary.inserted > 0 {
            UpsertOutcome::Inserted
        } else if summary.modified > 0 {
            UpsertOutcome::Modified
        } else {
            UpsertOutcome::Unchanged
        })
    }

    fn upsert_blocks(&self, blocks: Vec<Block>) -> Result<UpsertSummary> {
        let _write = self.write_lock.lock();
        self.with_db(|db| {
            let cf = blocks_cf(db)?;
            let mut summary = UpsertSummary::default();
            // Blocks written earlier in this call, not yet visible in the db.
            let mut staged: HashMap<u64, Block> = HashMap::new();

            for block in blocks {
                let id = block.id;
                let (doc, outcome) = match staged.get(&id) {
                    Some(pending) => apply_set(pending, block)?,
                    None => match Self::read_block(db, id)? {
                        None => (block, UpsertOutcome::Inserted),
                        Some(existing) => apply_set(&existing, block)?,
                    },
                };
                if outcome != UpsertOutcome::Unchanged {
                    staged.insert(id, doc);
                }
                summary.record(outcome);
            }

            let mut batch = WriteBatch::default();
            for (id, doc) in &staged {
                batch.put_cf(cf, key(*id), serde_json::to_vec(doc)?);
            }
            if !batch.is_empty() {
                db.write(batch).map_err(backend_err)?;
            }
            self.writes
                .fetch_add(summary.inserted + summary.modified, Ordering::Relaxed);
            Ok(summary)
        })
    }

    fn get_block(&self, id: u64) -> Result<Option<Block>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.with_db(|db| Self::read_block(db, id))
    }

    fn blocks_in_range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
        if start > end {
            return Ok(Vec::new());
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.with_db(|db| {
            let from = key(start);
            let mut blocks = Vec::new();
            for entry in db.iterator_cf(blocks_cf(db)?, IteratorMode::From(&from, Direction::Forward))
            {
                let (k, v) = entry.map_err(backend_err)?;
                if decode_key(&k)? > end {
                    break;
                }
                blocks.push(serde_json::from_slice(&v)?);
            }
            Ok(blocks)
        })
    }

    fn len(&self) -> Result<usize> {
        self.with_db(|db| {
            let mut count = 0;
            for entry in db.iterator_cf(blocks_cf(db)?, IteratorMode::Start) {
                entry.map_err(backend_err)?;
                count += 1;
            }
            Ok(count)
        })
    }

    fn flush(&self) -> Result<()> {
        self.with_db(|db| db.flush_cf(blocks_cf(db)?).map_err(backend_err))
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.db.write();
        if let Some(db) = guard.take() {
            db.flush_cf(blocks_cf(&db)?).map_err(backend_err)?;
            tracing::info!(path = %self.config.path.display(), "Closed RocksDB block store");
        }
        Ok(())
    }

    fn stats(&self) -> StorageStats {
        StorageStats {
            block_count: self.len().unwrap_or_default() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}
