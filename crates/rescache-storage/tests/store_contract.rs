//! Behaviour every block store backend must share.

use rescache_storage::{BlockStore, MemoryBlockStore, UpsertOutcome};
use rescache_types::{Block, Transaction, TransactionValue};
use std::sync::Arc;

fn block(id: u64, value: &str) -> Block {
    Block::new(id, "2024-01-01T00:00:00Z").with_transaction(Transaction::text("SET", "k", value))
}

fn check_contract(store: &dyn BlockStore) {
    store.connect().unwrap();
    assert!(store.is_empty().unwrap());
    assert_eq!(store.max_block_id().unwrap(), None);

    // Replaying a page is harmless.
    let page: Vec<Block> = (1..=5).map(|id| block(id, "v1")).collect();
    let first = store.upsert_blocks(page.clone()).unwrap();
    let replay = store.upsert_blocks(page).unwrap();
    assert_eq!(first.inserted, 5);
    assert_eq!(replay.unchanged, 5);
    assert_eq!(store.len().unwrap(), 5);

    // Latest content wins.
    assert_eq!(store.upsert(block(3, "v2")).unwrap(), UpsertOutcome::Modified);
    let stored = store.get_block(3).unwrap().unwrap();
    assert_eq!(
        stored.transactions[0].value,
        Some(TransactionValue::Text("v2".to_string()))
    );

    assert_eq!(store.max_block_id().unwrap(), Some(5));
    let ids: Vec<u64> = store.all_blocks().unwrap().iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    store.close().unwrap();
    store.close().unwrap();
    assert!(!store.is_connected());
}

/// A page that repeats an id merges the copies instead of counting both as new.
fn check_repeated_id_in_page(store: &dyn BlockStore) {
    store.connect().unwrap();
    let mut sized = Block::new(9, "2024-01-01T00:00:00Z");
    sized.size = Some(64);

    let summary = store.upsert_blocks(vec![sized, block(9, "v1")]).unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.modified, 1);

    let stored = store.get_block(9).unwrap().unwrap();
    assert_eq!(stored.size, Some(64));
    assert_eq!(stored.transactions.len(), 1);
    assert_eq!(store.len().unwrap(), 1);
    store.close().unwrap();
}

#[test]
fn memory_store_contract() {
    check_contract(&MemoryBlockStore::new());
    check_repeated_id_in_page(&MemoryBlockStore::new());
}

#[test]
fn arc_store_delegates() {
    let store = Arc::new(MemoryBlockStore::new());
    check_contract(&store);
    assert_eq!(store.stats().block_count, 5);
}

#[cfg(feature = "rocksdb-backend")]
#[test]
fn rocksdb_store_contract() {
    let dir = tempfile::TempDir::new().unwrap();
    check_contract(&rescache_storage::RocksDbBlockStore::at_path(dir.path()));

    let dir = tempfile::TempDir::new().unwrap();
    check_repeated_id_in_page(&rescache_storage::RocksDbBlockStore::at_path(dir.path()));
}
