//! # Rescache Sync
//!
//! Keeps a local block store eventually consistent with a remote ledger.
//!
//! ## How it works
//!
//! - **Backfill**: starting from the highest stored block id, pages of
//!   `batch_size` ids are probed until the ledger returns an empty page. The
//!   discovered pages are then fetched by a bounded pool of workers and
//!   upserted into the store.
//! - **Live channel**: a WebSocket subscription to the ledger's update
//!   listener. An `"Update blocks"` message triggers a new pass. Lost
//!   connections are retried with capped exponential backoff.
//! - **Periodic re-fetch**: a fixed interval triggers a pass regardless of the
//!   live channel.
//!
//! The cursor only advances over ranges that were actually persisted, so a
//! failed range is retried on the next pass.
//!
//! ## Events
//!
//! ```text
//! SyncEngine::subscribe() -> broadcast::Receiver<SyncEvent>
//!
//!   Connected | Disconnected { code, reason } | Error { kind, message } | Closed
//! ```

mod backfill;
pub mod backoff;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod hub;
mod live;
pub mod stats;

pub use backoff::ReconnectPolicy;
pub use client::{BlockSource, LedgerClient};
pub use config::{LedgerConfig, LedgerEndpoints, SyncOptions};
pub use engine::SyncEngine;
pub use error::{ApiError, Result, SyncError};
pub use event::{ErrorKind, LiveMessage, LiveState, SyncEvent, UPDATE_BLOCKS};
pub use hub::{EventHub, HubStats};
pub use stats::{PassReport, SyncStats};
