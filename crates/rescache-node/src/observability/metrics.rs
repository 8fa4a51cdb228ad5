//! Prometheus metrics collection.
//!
//! Provides metrics for:
//! - HTTP request latency and counts
//! - Sync engine progress (cursor, passes, upserts)
//! - Live channel connects, disconnects and errors

use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use rescache_sync::{LiveState, SyncEvent, SyncStats};
use std::sync::Arc;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path pattern
    pub path: String,
    /// Response status code
    pub status: u16,
}

/// Sync error labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Where the error happened (fetch, storage, channel).
    pub kind: String,
}

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// HTTP active connections gauge.
    pub http_active_connections: Gauge,
    /// Highest block id persisted without gaps.
    pub sync_cursor: Gauge,
    /// Blocks in the local mirror.
    pub blocks_stored: Gauge,
    /// 1 while the live channel is open.
    pub live_connected: Gauge,
    /// Completed backfill passes.
    pub sync_passes: Gauge,
    /// Ranges persisted.
    pub sync_ranges_synced: Gauge,
    /// Ranges that failed and were left for the next pass.
    pub sync_ranges_failed: Gauge,
    /// Blocks fetched from the ledger.
    pub sync_blocks_fetched: Gauge,
    /// Blocks inserted into the mirror.
    pub sync_blocks_inserted: Gauge,
    /// Reconnect attempts of the live channel.
    pub live_reconnect_attempts: Gauge,
    /// Live channel connects.
    pub live_connects_total: Counter,
    /// Live channel disconnects.
    pub live_disconnects_total: Counter,
    /// Non-fatal sync errors by kind.
    pub sync_errors_total: Family<ErrorLabels, Counter>,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("rescache");

        // HTTP metrics
        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_active_connections = Gauge::default();
        registry.register(
            "http_active_connections",
            "Number of active HTTP connections",
            http_active_connections.clone(),
        );

        // Sync engine snapshot, refreshed on every scrape
        let sync_cursor = Gauge::default();
        registry.register(
            "sync_cursor",
            "Highest block id persisted without gaps",
            sync_cursor.clone(),
        );

        let blocks_stored = Gauge::default();
        registry.register(
            "blocks_stored",
            "Blocks in the local mirror",
            blocks_stored.clone(),
        );

        let live_connected = Gauge::default();
        registry.register(
            "live_connected",
            "Whether the live update channel is open",
            live_connected.clone(),
        );

        let sync_passes = Gauge::default();
        registry.register(
            "sync_passes",
            "Completed backfill passes",
            sync_passes.clone(),
        );

        let sync_ranges_synced = Gauge::default();
        registry.register(
            "sync_ranges_synced",
            "Block ranges persisted",
            sync_ranges_synced.clone(),
        );

        let sync_ranges_failed = Gauge::default();
        registry.register(
            "sync_ranges_failed",
            "Block ranges that failed to sync",
            sync_ranges_failed.clone(),
        );

        let sync_blocks_fetched = Gauge::default();
        registry.register(
            "sync_blocks_fetched",
            "Blocks fetched from the ledger",
            sync_blocks_fetched.clone(),
        );

        let sync_blocks_inserted = Gauge::default();
        registry.register(
            "sync_blocks_inserted",
            "Blocks inserted into the mirror",
            sync_blocks_inserted.clone(),
        );

        let live_reconnect_attempts = Gauge::default();
        registry.register(
            "live_reconnect_attempts",
            "Reconnect attempts of the live update channel",
            live_reconnect_attempts.clone(),
        );

        // Engine events
        let live_connects_total = Counter::default();
        registry.register(
            "live_connects",
            "Live update channel connects",
            live_connects_total.clone(),
        );

        let live_disconnects_total = Counter::default();
        registry.register(
            "live_disconnects",
            "Live update channel disconnects",
            live_disconnects_total.clone(),
        );

        let sync_errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "sync_errors",
            "Non-fatal sync errors by kind",
            sync_errors_total.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            http_active_connections,
            sync_cursor,
            blocks_stored,
            live_connected,
            sync_passes,
            sync_ranges_synced,
            sync_ranges_failed,
            sync_blocks_fetched,
            sync_blocks_inserted,
            live_reconnect_attempts,
            live_connects_total,
            live_disconnects_total,
            sync_errors_total,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: path.to_string(),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record an engine event.
    pub fn record_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Connected => {
                self.live_connects_total.inc();
            }
            SyncEvent::Disconnected { .. } => {
                self.live_disconnects_total.inc();
            }
            SyncEvent::Error { kind, .. } => {
                self.sync_errors_total
                    .get_or_create(&ErrorLabels {
                        kind: kind.to_string(),
                    })
                    .inc();
            }
            SyncEvent::Closed => {}
        }
    }

    /// Copy an engine snapshot into the gauges.
    pub fn observe_sync(&self, stats: &SyncStats, blocks_stored: Option<usize>) {
        self.sync_cursor.set(saturating_i64(stats.cursor));
        self.live_connected
            .set(i64::from(stats.live_state == LiveState::Connected));
        self.sync_passes.set(saturating_i64(stats.passes));
        self.sync_ranges_synced
            .set(saturating_i64(stats.ranges_synced));
        self.sync_ranges_failed
            .set(saturating_i64(stats.ranges_failed));
        self.sync_blocks_fetched
            .set(saturating_i64(stats.blocks_fetched));
        self.sync_blocks_inserted
            .set(saturating_i64(stats.blocks_inserted));
        self.live_reconnect_attempts
            .set(saturating_i64(stats.reconnect_attempts));
        if let Some(count) = blocks_stored {
            self.blocks_stored.set(saturating_i64(count as u64));
        }
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
        Ok(buffer)
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
