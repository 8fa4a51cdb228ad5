//! Common types used throughout `rescache`.
//!
//! This crate provides the data transfer objects mirrored from the remote
//! ledger and the time-series types served to dashboards.

mod block;
mod series;

pub use block::{looks_like_json, try_parse_json, Block, Transaction, TransactionValue};
pub use series::{
    BatchRange, DecodedPoint, DeltaEncodedData, TimeSeriesPoint, DEFAULT_TIME_MULTIPLIER,
};

/// URI scheme identifying a ledger base URL (`resilientdb://host:port`).
pub const LEDGER_SCHEME: &str = "resilientdb";
