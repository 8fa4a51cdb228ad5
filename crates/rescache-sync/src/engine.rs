//! The sync engine: lifecycle, shared state and background tasks.

use crate::backoff::ReconnectPolicy;
use crate::client::{BlockSource, LedgerClient};
use crate::config::{LedgerConfig, LedgerEndpoints, SyncOptions};
use crate::error::{Result, SyncError};
use crate::event::{LiveState, SyncEvent};
use crate::hub::{EventHub, HubStats};
use crate::stats::{Counters, PassReport, SyncStats};
use parking_lot::{Mutex, RwLock};
use rescache_storage::BlockStore;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared between the engine handle and its background tasks.
pub(crate) struct EngineInner {
    pub(crate) store: Arc<dyn BlockStore>,
    pub(crate) source: Arc<dyn BlockSource>,
    pub(crate) options: SyncOptions,
    pub(crate) cursor: AtomicU64,
    pub(crate) hub: EventHub,
    pub(crate) counters: Counters,
    pub(crate) last_pass: RwLock<Option<PassReport>>,
    /// Serializes backfill passes.
    pub(crate) pass_lock: tokio::sync::Mutex<()>,
    pub(crate) live_state: AtomicU8,
    pub(crate) trigger_tx: mpsc::Sender<()>,
    pub(crate) cancel: CancellationToken,
}

impl EngineInner {
    pub(crate) fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Moves the cursor forward. Never moves it back.
    pub(crate) fn advance_cursor(&self, to: u64) -> u64 {
        self.cursor.fetch_max(to, Ordering::SeqCst).max(to)
    }

    pub(crate) fn live_state(&self) -> LiveState {
        LiveState::from_u8(self.live_state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_live_state(&self, state: LiveState) {
        self.live_state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Asks the driver for a pass. Requests made while one is pending coalesce.
    pub(crate) fn request_pass(&self) {
        match self.trigger_tx.try_send(()) {
            Ok(()) => debug!("Sync pass requested"),
            Err(mpsc::error::TrySendError::Full(())) => debug!("Sync pass already pending"),
            Err(mpsc::error::TrySendError::Closed(())) => {}
        }
    }

    /// Runs passes on request and on every tick of the re-fetch interval.
    async fn run_driver(self: Arc<Self>, mut triggers: mpsc::Receiver<()>, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = period.as_millis() as u64, "Started periodic fetch");

        loop {
            let reason = tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => "interval",
                Some(()) = triggers.recv() => "notification",
            };

            debug!(reason, "Starting sync pass");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.run_pass() => {}
            }
        }

        info!("Stopped periodic fetch");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Running,
    Closed,
}

struct Lifecycle {
    phase: Phase,
    tasks: Vec<JoinHandle<()>>,
    triggers: Option<mpsc::Receiver<()>>,
}

/// Keeps a [`BlockStore`] eventually consistent with the remote ledger.
///
/// Blocks are pulled page by page over HTTP. A WebSocket notification channel
/// and a fixed re-fetch interval both trigger new passes.
///
/// # Example
///
/// ```rust,no_run
/// use rescache_storage::MemoryBlockStore;
/// use rescache_sync::{LedgerConfig, SyncEngine, SyncOptions};
/// use std::sync::Arc;
///
/// # async fn run() -> rescache_sync::Result<()> {
/// let engine = SyncEngine::new(
///     LedgerConfig::new("resilientdb://localhost:18000"),
///     SyncOptions::default(),
///     Arc::new(MemoryBlockStore::new()),
///     None,
/// )?;
///
/// let mut events = engine.subscribe();
/// engine.initialize().await?;
/// while let Ok(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// engine.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    endpoints: LedgerEndpoints,
    reconnect: ReconnectPolicy,
    fetch_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("endpoints", &self.endpoints)
            .field("cursor", &self.inner.cursor())
            .field("live_state", &self.inner.live_state())
            .finish()
    }
}

impl SyncEngine {
    /// Creates an engine. Nothing runs until [`SyncEngine::initialize`].
    ///
    /// Without an explicit `source`, pages are fetched from the ledger's
    /// HTTP API.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidBaseUrl`] if `ledger.base_url` is not a
    /// `resilientdb://host:port` address.
    pub fn new(
        ledger: LedgerConfig,
        options: SyncOptions,
        store: Arc<dyn BlockStore>,
        source: Option<Arc<dyn BlockSource>>,
    ) -> Result<Self> {
        let endpoints = LedgerEndpoints::resolve(&ledger)?;
        let source = match source {
            Some(source) => source,
            None => {
                let client = LedgerClient::new(endpoints.http.clone())?;
                debug!(endpoint = client.endpoint(), "Using ledger block API");
                Arc::new(client)
            }
        };

        let options = SyncOptions {
            batch_size: options.batch_size.max(1),
            concurrency: options.concurrency.max(1),
            ..options
        };
        let reconnect = ReconnectPolicy::new(
            ledger.reconnect_interval(),
            options.max_reconnect_delay(),
        );
        let fetch_interval = ledger.fetch_interval().max(Duration::from_millis(1));

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let inner = Arc::new(EngineInner {
            store,
            source,
            options,
            cursor: AtomicU64::new(0),
            hub: EventHub::new(),
            counters: Counters::default(),
            last_pass: RwLock::new(None),
            pass_lock: tokio::sync::Mutex::new(()),
            live_state: AtomicU8::new(LiveState::Disconnected.as_u8()),
            trigger_tx,
            cancel: CancellationToken::new(),
        });

        Ok(Self {
            inner,
            endpoints,
            reconnect,
            fetch_interval,
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Idle,
                tasks: Vec::new(),
                triggers: Some(trigger_rx),
            }),
        })
    }

    /// Connects the store, backfills to the ledger head, then starts the
    /// periodic re-fetch and the live channel.
    ///
    /// Only the store connection can fail this call; errors during the
    /// initial backfill are emitted as events.
    ///
    /// # Errors
    ///
    /// * [`SyncError::Storage`] - The store could not be connected
    /// * [`SyncError::AlreadyInitialized`] - Called more than once
    /// * [`SyncError::Closed`] - The engine was closed
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.phase {
                Phase::Idle => lifecycle.phase = Phase::Starting,
                Phase::Closed => return Err(SyncError::Closed),
                Phase::Starting | Phase::Running => return Err(SyncError::AlreadyInitialized),
            }
        }

        if let Err(e) = self.connect_store() {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.phase == Phase::Starting {
                lifecycle.phase = Phase::Idle;
            }
            return Err(e);
        }

        tokio::select! {
            _ = self.inner.cancel.cancelled() => return Err(SyncError::Closed),
            report = self.inner.run_pass() => {
                let Some(report) = report else {
                    return Err(SyncError::Closed);
                };
                info!(
                    cursor = report.cursor_after,
                    ranges = report.ranges.len(),
                    "Initial sync complete"
                );
            }
        }

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase == Phase::Closed {
            return Err(SyncError::Closed);
        }
        let triggers = lifecycle.triggers.take().ok_or(SyncError::AlreadyInitialized)?;

        let driver = tokio::spawn(Arc::clone(&self.inner).run_driver(triggers, self.fetch_interval));
        let live = tokio::spawn(
            Arc::clone(&self.inner).run_live(
                self.endpoints.ws.clone(),
                self.reconnect,
                self.inner.options.connect_timeout(),
            ),
        );
        lifecycle.tasks.extend([driver, live]);
        lifecycle.phase = Phase::Running;

        info!(ws = %self.endpoints.ws, "Sync engine running");
        Ok(())
    }

    fn connect_store(&self) -> Result<()> {
        self.inner.store.connect()?;
        let cursor = self.inner.store.max_block_id()?.unwrap_or(0);
        self.inner.cursor.store(cursor, Ordering::SeqCst);
        info!(cursor, "Connected to block store");
        Ok(())
    }

    /// Stops the engine and closes the store.
    ///
    /// Suppresses reconnects, stops the periodic re-fetch, lets an in-flight
    /// connection attempt finish and then closes that socket. Emits a single
    /// [`SyncEvent::Closed`]. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the store failed to close.
    pub async fn close(&self) -> Result<()> {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.phase == Phase::Closed {
                return Ok(());
            }
            lifecycle.phase = Phase::Closed;
            std::mem::take(&mut lifecycle.tasks)
        };

        info!("Closing sync engine");
        self.inner.cancel.cancel();

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync task ended abnormally");
            }
        }
        self.inner.set_live_state(LiveState::Disconnected);

        // A manual pass may still hold the store; passes queued after it
        // see the cancellation and return early.
        let _idle = self.inner.pass_lock.lock().await;

        let result = self.inner.store.close();
        if let Err(e) = &result {
            warn!(error = %e, "Failed to close block store");
        }

        self.inner.hub.emit(SyncEvent::Closed);
        info!("Sync engine closed");
        result.map_err(Into::into)
    }

    /// Runs a backfill pass now and waits for it.
    ///
    /// Waits for a pass already in progress to finish first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] after [`SyncEngine::close`], including
    /// when close starts while this call waits for another pass.
    pub async fn sync_now(&self) -> Result<PassReport> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        self.inner.run_pass().await.ok_or(SyncError::Closed)
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.hub.subscribe()
    }

    /// Highest block id persisted without gaps.
    pub fn cursor(&self) -> u64 {
        self.inner.cursor()
    }

    /// State of the live channel.
    pub fn live_state(&self) -> LiveState {
        self.inner.live_state()
    }

    /// Current statistics.
    pub fn stats(&self) -> SyncStats {
        self.inner
            .counters
            .snapshot(self.inner.cursor(), self.inner.live_state())
    }

    /// Counters of emitted events.
    pub fn event_stats(&self) -> HubStats {
        self.inner.hub.stats()
    }

    /// Report of the most recent completed pass.
    pub fn last_pass(&self) -> Option<PassReport> {
        self.inner.last_pass.read().clone()
    }

    /// The resolved ledger endpoints.
    pub fn endpoints(&self) -> &LedgerEndpoints {
        &self.endpoints
    }

    /// True once [`SyncEngine::initialize`] has started the background tasks.
    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().phase == Phase::Running
    }

    /// True once [`SyncEngine::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lifecycle.lock().phase == Phase::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use async_trait::async_trait;
    use rescache_storage::MemoryBlockStore;
    use rescache_types::{BatchRange, Block};

    struct EmptyLedger;

    #[async_trait]
    impl BlockSource for EmptyLedger {
        async fn fetch_range(&self, _range: BatchRange) -> std::result::Result<Vec<Block>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn engine(base_url: &str) -> Result<SyncEngine> {
        SyncEngine::new(
            LedgerConfig::new(base_url),
            SyncOptions::default(),
            Arc::new(MemoryBlockStore::new()),
            Some(Arc::new(EmptyLedger)),
        )
    }

    #[test]
    fn test_new_rejects_invalid_scheme() {
        assert!(matches!(
            engine("http://localhost:18000"),
            Err(SyncError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_cursor_never_moves_back() {
        let engine = engine("resilientdb://localhost:18000").unwrap();
        assert_eq!(engine.inner.advance_cursor(10), 10);
        assert_eq!(engine.inner.advance_cursor(4), 10);
        assert_eq!(engine.cursor(), 10);
    }

    #[test]
    fn test_options_are_clamped() {
        let engine = SyncEngine::new(
            LedgerConfig::new("resilientdb://localhost:18000"),
            SyncOptions {
                batch_size: 0,
                concurrency: 0,
                ..Default::default()
            },
            Arc::new(MemoryBlockStore::new()),
            Some(Arc::new(EmptyLedger)),
        )
        .unwrap();
        assert_eq!(engine.inner.options.batch_size, 1);
        assert_eq!(engine.inner.options.concurrency, 1);
    }

    #[tokio::test]
    async fn test_close_before_initialize() {
        let engine = engine("resilientdb://localhost:18000").unwrap();
        let mut events = engine.subscribe();

        engine.close().await.unwrap();
        engine.close().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), SyncEvent::Closed);
        assert!(events.try_recv().is_err());
        assert!(matches!(engine.initialize().await, Err(SyncError::Closed)));
        assert!(matches!(engine.sync_now().await, Err(SyncError::Closed)));
    }
}
