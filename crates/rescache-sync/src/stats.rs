//! Engine statistics and pass reports.

use crate::event::LiveState;
use rescache_storage::UpsertSummary;
use rescache_types::BatchRange;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of one backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Cursor when the pass started.
    pub cursor_before: u64,
    /// Cursor when the pass finished.
    pub cursor_after: u64,
    /// Ranges discovered by the scan, in dispatch order.
    pub ranges: Vec<BatchRange>,
    /// Ranges that could not be persisted.
    pub failed_ranges: Vec<BatchRange>,
    /// Blocks fetched by the workers.
    pub blocks_fetched: u64,
    /// Upsert results across all persisted ranges.
    pub upserts: UpsertSummary,
    /// True if the scan stopped on an error rather than an empty page.
    pub scan_failed: bool,
}

impl PassReport {
    /// A pass that found nothing new.
    pub(crate) fn up_to_date(cursor: u64, scan_failed: bool) -> Self {
        Self {
            cursor_before: cursor,
            cursor_after: cursor,
            scan_failed,
            ..Default::default()
        }
    }

    /// True when the pass found nothing to sync.
    pub fn is_noop(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Running counters, updated lock-free by the workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub passes: AtomicU64,
    pub ranges_synced: AtomicU64,
    pub ranges_failed: AtomicU64,
    pub blocks_fetched: AtomicU64,
    pub blocks_inserted: AtomicU64,
    pub blocks_modified: AtomicU64,
    pub blocks_unchanged: AtomicU64,
    pub reconnect_attempts: AtomicU64,
}

impl Counters {
    pub(crate) fn record_upserts(&self, summary: &UpsertSummary) {
        self.blocks_inserted
            .fetch_add(summary.inserted, Ordering::Relaxed);
        self.blocks_modified
            .fetch_add(summary.modified, Ordering::Relaxed);
        self.blocks_unchanged
            .fetch_add(summary.unchanged, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, cursor: u64, live_state: LiveState) -> SyncStats {
        SyncStats {
            cursor,
            live_state,
            passes: self.passes.load(Ordering::Relaxed),
            ranges_synced: self.ranges_synced.load(Ordering::Relaxed),
            ranges_failed: self.ranges_failed.load(Ordering::Relaxed),
            blocks_fetched: self.blocks_fetched.load(Ordering::Relaxed),
            blocks_inserted: self.blocks_inserted.load(Ordering::Relaxed),
            blocks_modified: self.blocks_modified.load(Ordering::Relaxed),
            blocks_unchanged: self.blocks_unchanged.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Highest block id known to be persisted contiguously.
    pub cursor: u64,
    /// State of the live channel.
    pub live_state: LiveState,
    /// Completed backfill passes.
    pub passes: u64,
    /// Ranges persisted.
    pub ranges_synced: u64,
    /// Ranges that failed to fetch or persist.
    pub ranges_failed: u64,
    /// Blocks fetched by workers.
    pub blocks_fetched: u64,
    /// Blocks newly inserted.
    pub blocks_inserted: u64,
    /// Blocks whose stored content changed.
    pub blocks_modified: u64,
    /// Blocks replayed without change.
    pub blocks_unchanged: u64,
    /// Reconnect attempts of the live channel.
    pub reconnect_attempts: u64,
}
