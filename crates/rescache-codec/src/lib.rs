//! # Rescache Codec
//!
//! Compact transport of block time series for dashboards.
//!
//! A series of `(epoch, volume)` points is encoded as its first point plus
//! per-point deltas, with epochs normalized from microseconds to seconds.
//!
//! ## Example
//!
//! ```rust
//! use rescache_codec::{decode, encode};
//! use rescache_types::TimeSeriesPoint;
//!
//! let series = vec![
//!     TimeSeriesPoint::new(1_000_000, 5),
//!     TimeSeriesPoint::new(2_000_000, 8),
//!     TimeSeriesPoint::new(2_500_000, 3),
//! ];
//!
//! let encoded = encode(&series);
//! assert_eq!(encoded.epochs, vec![1.0, 0.5]);
//! assert_eq!(encoded.volumes, vec![3, -5]);
//!
//! let decoded: Vec<TimeSeriesPoint> = decode(&encoded)
//!     .unwrap()
//!     .into_iter()
//!     .map(Into::into)
//!     .collect();
//! assert_eq!(decoded, series);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod delta;
pub mod error;
pub mod series;
pub mod timestamp;

pub use delta::{decode, encode};
pub use error::{CodecError, Result};
pub use series::{encode_blocks, series_from_blocks};
pub use timestamp::{format_epoch_micros, parse_created_at};
