//! Time-series types exchanged with dashboards.

use serde::{Deserialize, Serialize};

/// Divisor applied to epochs before delta encoding (microseconds to seconds).
pub const DEFAULT_TIME_MULTIPLIER: i64 = 1_000_000;

/// A single `(epoch, volume)` sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Microseconds since the Unix epoch.
    pub epoch: i64,
    /// Sample value (transaction count for block series).
    pub volume: i64,
}

impl TimeSeriesPoint {
    /// Creates a new point.
    pub const fn new(epoch: i64, volume: i64) -> Self {
        Self { epoch, volume }
    }
}

/// Delta-encoded form of an ascending time series.
///
/// Element `i` of `epochs`/`volumes` is the difference from the previous
/// reconstructed point; epochs are divided by `time_multiplier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaEncodedData {
    /// First epoch divided by `time_multiplier`.
    pub start_epoch: f64,
    /// First volume.
    pub start_volume: i64,
    /// Epoch normalization factor.
    #[serde(default = "default_time_multiplier")]
    pub time_multiplier: i64,
    /// Normalized epoch deltas.
    pub epochs: Vec<f64>,
    /// Volume deltas, possibly negative.
    pub volumes: Vec<i64>,
}

fn default_time_multiplier() -> i64 {
    DEFAULT_TIME_MULTIPLIER
}

impl DeltaEncodedData {
    /// The canonical encoding of an empty series.
    pub fn empty() -> Self {
        Self {
            start_epoch: 0.0,
            start_volume: 0,
            time_multiplier: DEFAULT_TIME_MULTIPLIER,
            epochs: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Number of points this encoding decodes to.
    pub fn point_count(&self) -> usize {
        self.epochs.len() + 1
    }
}

impl Default for DeltaEncodedData {
    fn default() -> Self {
        Self::empty()
    }
}

/// A decoded point carrying a human-readable timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPoint {
    /// Microseconds since the Unix epoch.
    pub epoch: i64,
    /// Sample value.
    pub volume: i64,
    /// RFC 3339 rendering of `epoch`.
    pub created_at: String,
}

impl From<DecodedPoint> for TimeSeriesPoint {
    fn from(point: DecodedPoint) -> Self {
        Self::new(point.epoch, point.volume)
    }
}

/// An inclusive page of block ids requested from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchRange {
    /// First block id of the page.
    pub min_seq: u64,
    /// Last block id of the page.
    pub max_seq: u64,
}

impl BatchRange {
    /// Creates a range from explicit bounds.
    pub const fn new(min_seq: u64, max_seq: u64) -> Self {
        Self { min_seq, max_seq }
    }

    /// The page of `batch_size` ids that follows `cursor`.
    pub fn after(cursor: u64, batch_size: u64) -> Self {
        let min_seq = cursor.saturating_add(1);
        let max_seq = min_seq.saturating_add(batch_size.max(1) - 1);
        Self { min_seq, max_seq }
    }

    /// Returns true if `id` falls inside this range.
    pub const fn contains(&self, id: u64) -> bool {
        id >= self.min_seq && id <= self.max_seq
    }
}

impl std::fmt::Display for BatchRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.min_seq, self.max_seq)
    }
}
