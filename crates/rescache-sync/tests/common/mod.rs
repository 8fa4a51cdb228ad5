//! Shared fixtures for the sync engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rescache_storage::{BlockStore, MemoryBlockStore};
use rescache_sync::{ApiError, BlockSource, LedgerConfig, SyncEngine, SyncEvent, SyncOptions};
use rescache_types::{BatchRange, Block, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// In-memory ledger that records how it is called.
#[derive(Default)]
pub struct MockLedger {
    blocks: Mutex<Vec<Block>>,
    /// `min_seq -> call number` that should fail.
    failures: Mutex<HashMap<u64, usize>>,
    calls: Mutex<HashMap<u64, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    total_calls: AtomicUsize,
    delay: Duration,
}

impl MockLedger {
    pub fn with_blocks(count: u64) -> Self {
        let ledger = Self::default();
        ledger.append(1..=count);
        ledger
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn append(&self, ids: impl IntoIterator<Item = u64>) {
        self.blocks.lock().extend(ids.into_iter().map(block));
    }

    /// Fails the `call`-th request (1-based) for the page starting at `min_seq`.
    pub fn fail_on(&self, min_seq: u64, call: usize) {
        self.failures.lock().insert(min_seq, call);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockSource for MockLedger {
    async fn fetch_range(&self, range: BatchRange) -> Result<Vec<Block>, ApiError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(range.min_seq).or_default();
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failures.lock().get(&range.min_seq) == Some(&call) {
            return Err(ApiError::NodeError {
                status: 503,
                message: format!("injected failure for {range}"),
            });
        }

        Ok(self
            .blocks
            .lock()
            .iter()
            .filter(|b| range.contains(b.id))
            .cloned()
            .collect())
    }
}

pub fn block(id: u64) -> Block {
    Block::new(id, "Mon, 01 Jan 2024 00:00:00 GMT")
        .with_transaction(Transaction::text("SET", format!("key{id}"), format!("{{\"n\":{id}}}")))
}

pub fn options(batch_size: u64, concurrency: usize) -> SyncOptions {
    SyncOptions {
        batch_size,
        concurrency,
        max_reconnect_delay_ms: 400,
        connect_timeout_ms: 2_000,
    }
}

/// Ledger config whose live channel points at `ws`.
pub fn ledger_config(ws: &str) -> LedgerConfig {
    LedgerConfig {
        ws_endpoint: Some(ws.to_string()),
        reconnect_interval_ms: 50,
        fetch_interval_ms: 60_000,
        ..LedgerConfig::new("resilientdb://127.0.0.1:18000")
    }
}

/// A `ws://` URL nothing listens on.
pub async fn unreachable_ws() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/blockupdatelistener")
}

/// A listener for an in-process update channel and its `ws://` URL.
pub async fn ws_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/blockupdatelistener", listener.local_addr().unwrap());
    (listener, url)
}

pub fn engine(
    ws: &str,
    options: SyncOptions,
    store: Arc<MemoryBlockStore>,
    ledger: Arc<MockLedger>,
) -> SyncEngine {
    engine_with(ledger_config(ws), options, store, ledger)
}

pub fn engine_with(
    config: LedgerConfig,
    options: SyncOptions,
    store: Arc<MemoryBlockStore>,
    ledger: Arc<MockLedger>,
) -> SyncEngine {
    let store: Arc<dyn BlockStore> = store;
    let source: Arc<dyn BlockSource> = ledger;
    SyncEngine::new(config, options, store, Some(source)).unwrap()
}

/// Waits for the first event matching `pred`, failing after five seconds.
pub async fn wait_for(
    events: &mut broadcast::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event hub closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Polls `check` until it holds, failing after five seconds.
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
