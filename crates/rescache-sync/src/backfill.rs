//! Backfill passes: scan the ledger for new pages, then fetch and persist
//! them with a bounded number of workers.

use crate::engine::EngineInner;
use crate::error::SyncError;
use crate::event::{ErrorKind, SyncEvent};
use crate::stats::PassReport;
use futures::future::join_all;
use parking_lot::Mutex;
use rescache_storage::UpsertSummary;
use rescache_types::{BatchRange, Block};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// What happened to one range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOutcome {
    /// Blocks were written; `max_id` is the highest persisted id.
    Persisted {
        max_id: u64,
        summary: UpsertSummary,
        fetched: u64,
    },
    /// The ledger returned nothing for a range the scan saw blocks in.
    Empty,
    /// Fetching or persisting failed.
    Failed,
}

/// Ranges found by a scan.
struct Scan {
    ranges: Vec<BatchRange>,
    failed: bool,
}

impl EngineInner {
    /// Runs one backfill pass from the current cursor.
    ///
    /// Errors are logged and emitted, not returned. The cursor only advances
    /// over the contiguous prefix of ranges that were persisted, so a failed
    /// range is retried by the next pass.
    ///
    /// Returns `None` without touching the ledger or the store once the
    /// engine is closing.
    pub(crate) async fn run_pass(&self) -> Option<PassReport> {
        let _pass = self.pass_lock.lock().await;
        if self.cancel.is_cancelled() {
            debug!("Engine closing, skipping sync pass");
            return None;
        }
        let start = self.cursor();

        let scan = self.scan(start).await;
        if scan.ranges.is_empty() {
            if !scan.failed {
                info!(cursor = start, "Already up to date");
            }
            let report = PassReport::up_to_date(start, scan.failed);
            self.finish_pass(&report);
            return Some(report);
        }

        info!(
            cursor = start,
            batches = scan.ranges.len(),
            "Fetching new blocks"
        );
        let outcomes = self.persist_ranges(&scan.ranges).await;

        let mut report = PassReport {
            cursor_before: start,
            ranges: scan.ranges.clone(),
            scan_failed: scan.failed,
            ..Default::default()
        };

        let mut advance_to = start;
        let mut contiguous = true;
        for (range, outcome) in scan.ranges.iter().zip(&outcomes) {
            match *outcome {
                RangeOutcome::Persisted {
                    max_id,
                    summary,
                    fetched,
                } => {
                    report.blocks_fetched += fetched;
                    report.upserts.inserted += summary.inserted;
                    report.upserts.modified += summary.modified;
                    report.upserts.unchanged += summary.unchanged;
                    if contiguous {
                        advance_to = advance_to.max(max_id);
                    }
                }
                RangeOutcome::Empty => contiguous = false,
                RangeOutcome::Failed => {
                    report.failed_ranges.push(*range);
                    contiguous = false;
                }
            }
        }

        report.cursor_after = self.advance_cursor(advance_to);
        if report.failed_ranges.is_empty() {
            info!(
                cursor = report.cursor_after,
                blocks = report.blocks_fetched,
                inserted = report.upserts.inserted,
                "Sync pass complete"
            );
        } else {
            warn!(
                cursor = report.cursor_after,
                failed = report.failed_ranges.len(),
                "Sync pass incomplete, failed ranges will be retried"
            );
        }

        self.finish_pass(&report);
        Some(report)
    }

    fn finish_pass(&self, report: &PassReport) {
        self.counters.passes.fetch_add(1, Ordering::Relaxed);
        *self.last_pass.write() = Some(report.clone());
    }

    /// Probes consecutive pages after `start` until one comes back empty.
    async fn scan(&self, start: u64) -> Scan {
        let batch_size = self.options.batch_size;
        let mut position = start;
        let mut ranges = Vec::new();

        loop {
            let range = BatchRange::after(position, batch_size);
            match self.source.fetch_range(range).await {
                Ok(blocks) if blocks.is_empty() => break,
                Ok(blocks) => {
                    let max_id = blocks.iter().map(|b| b.id).max().unwrap_or(0);
                    if max_id <= position {
                        warn!(range = %range, max_id, "Ledger page did not advance, stopping scan");
                        break;
                    }
                    debug!(range = %range, max_id, "Discovered batch");
                    ranges.push(range);
                    position = max_id;
                }
                Err(e) => {
                    warn!(range = %range, error = %e, "Error probing for new blocks");
                    self.hub.emit(SyncEvent::error(ErrorKind::Fetch, &e));
                    return Scan {
                        ranges,
                        failed: true,
                    };
                }
            }
        }

        Scan {
            ranges,
            failed: false,
        }
    }

    /// Fetches and stores `ranges` with at most `concurrency` in flight.
    ///
    /// Returns one outcome per range, in the order given.
    async fn persist_ranges(&self, ranges: &[BatchRange]) -> Vec<RangeOutcome> {
        let queue = Mutex::new(ranges.iter().copied().enumerate().collect::<VecDeque<_>>());
        let outcomes = Mutex::new(vec![RangeOutcome::Failed; ranges.len()]);
        let workers = self.options.concurrency.min(ranges.len());
        let (queue_ref, outcomes_ref) = (&queue, &outcomes);

        join_all((0..workers).map(|worker| async move {
            loop {
                let next = queue_ref.lock().pop_front();
                let Some((index, range)) = next else {
                    break;
                };
                let outcome = self.sync_range(worker, range).await;
                outcomes_ref.lock()[index] = outcome;
            }
        }))
        .await;

        outcomes.into_inner()
    }

    async fn sync_range(&self, worker: usize, range: BatchRange) -> RangeOutcome {
        match self.fetch_and_store(range).await {
            Ok(Some((max_id, summary, fetched))) => {
                self.counters.ranges_synced.fetch_add(1, Ordering::Relaxed);
                debug!(worker, range = %range, blocks = fetched, "Synced batch");
                RangeOutcome::Persisted {
                    max_id,
                    summary,
                    fetched,
                }
            }
            Ok(None) => {
                info!(worker, range = %range, "No blocks fetched for range");
                RangeOutcome::Empty
            }
            Err(e) => {
                self.counters.ranges_failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, range = %range, error = %e, "Failed to sync batch");
                let kind = match &e {
                    SyncError::Storage(_) => ErrorKind::Storage,
                    _ => ErrorKind::Fetch,
                };
                self.hub.emit(SyncEvent::error(kind, format!("{range}: {e}")));
                RangeOutcome::Failed
            }
        }
    }

    async fn fetch_and_store(
        &self,
        range: BatchRange,
    ) -> Result<Option<(u64, UpsertSummary, u64)>, SyncError> {
        let blocks = self.source.fetch_range(range).await?;
        let Some(max_id) = blocks.iter().map(|b| b.id).max() else {
            return Ok(None);
        };

        let fetched = blocks.len() as u64;
        self.counters
            .blocks_fetched
            .fetch_add(fetched, Ordering::Relaxed);

        let blocks: Vec<Block> = blocks.into_iter().map(Block::normalize_values).collect();
        let summary = self.store.upsert_blocks(blocks)?;
        self.counters.record_upserts(&summary);

        Ok(Some((max_id, summary, fetched)))
    }
}
