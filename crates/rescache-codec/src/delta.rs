//! Lossless delta encoding of ascending `(epoch, volume)` series.

use crate::error::{CodecError, Result};
use crate::timestamp::format_epoch_micros;
use rescache_types::{DecodedPoint, DeltaEncodedData, TimeSeriesPoint, DEFAULT_TIME_MULTIPLIER};

/// Encodes an ascending series as deltas from its first point.
///
/// An empty series yields [`DeltaEncodedData::empty`].
pub fn encode(series: &[TimeSeriesPoint]) -> DeltaEncodedData {
    let Some(first) = series.first() else {
        return DeltaEncodedData::empty();
    };
    let multiplier = DEFAULT_TIME_MULTIPLIER as f64;

    let (epochs, volumes) = series
        .windows(2)
        .map(|pair| {
            let epoch_delta = pair[1].epoch.saturating_sub(pair[0].epoch) as f64 / multiplier;
            (epoch_delta, pair[1].volume.saturating_sub(pair[0].volume))
        })
        .unzip();

    DeltaEncodedData {
        start_epoch: first.epoch as f64 / multiplier,
        start_volume: first.volume,
        time_multiplier: DEFAULT_TIME_MULTIPLIER,
        epochs,
        volumes,
    }
}

/// Reconstructs the series described by `encoded`.
///
/// Each epoch is `(previous / multiplier + delta) * multiplier`, computed as
/// `previous + delta * multiplier` and rounded to the nearest microsecond so
/// that `decode(encode(s))` reproduces `s` exactly.
pub fn decode(encoded: &DeltaEncodedData) -> Result<Vec<DecodedPoint>> {
    if encoded.epochs.len() != encoded.volumes.len() {
        return Err(CodecError::LengthMismatch {
            epochs: encoded.epochs.len(),
            volumes: encoded.volumes.len(),
        });
    }
    if encoded.time_multiplier <= 0 {
        return Err(CodecError::InvalidMultiplier(encoded.time_multiplier));
    }
    let multiplier = encoded.time_multiplier as f64;

    let mut epoch = to_micros(encoded.start_epoch * multiplier, 0)?;
    let mut volume = encoded.start_volume;

    let mut points = Vec::with_capacity(encoded.point_count());
    points.push(decoded_point(epoch, volume));

    for (i, (epoch_delta, volume_delta)) in encoded.epochs.iter().zip(&encoded.volumes).enumerate()
    {
        let index = i + 1;
        let step = to_micros(epoch_delta * multiplier, index)?;
        epoch = epoch
            .checked_add(step)
            .ok_or(CodecError::OutOfRange { index })?;
        volume = volume
            .checked_add(*volume_delta)
            .ok_or(CodecError::OutOfRange { index })?;
        points.push(decoded_point(epoch, volume));
    }

    Ok(points)
}

fn decoded_point(epoch: i64, volume: i64) -> DecodedPoint {
    DecodedPoint {
        epoch,
        volume,
        created_at: format_epoch_micros(epoch),
    }
}

fn to_micros(value: f64, index: usize) -> Result<i64> {
    let rounded = value.round();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    if !rounded.is_finite() || rounded >= i64::MAX as f64 || rounded < i64::MIN as f64 {
        return Err(CodecError::OutOfRange { index });
    }
    Ok(rounded as i64)
}
