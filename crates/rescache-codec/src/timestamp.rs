//! Conversions between ledger timestamps and epoch microseconds.

use chrono::{DateTime, NaiveDateTime, SecondsFormat};

/// Layouts accepted for naive (zone-less) ledger timestamps, interpreted as UTC.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Renders epoch microseconds as an RFC 3339 UTC string with millisecond precision.
///
/// Epochs outside chrono's representable range are rendered as the raw number.
pub fn format_epoch_micros(epoch: i64) -> String {
    match DateTime::from_timestamp_micros(epoch) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => epoch.to_string(),
    }
}

/// Parses a ledger `createdAt` string into epoch microseconds.
///
/// Accepts RFC 3339, RFC 2822 and the naive layouts in [`NAIVE_LAYOUTS`]
/// (optionally suffixed by `GMT` or `UTC`).
pub fn parse_created_at(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_micros());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.timestamp_micros());
    }

    let naive = trimmed
        .strip_suffix("GMT")
        .or_else(|| trimmed.strip_suffix("UTC"))
        .unwrap_or(trimmed)
        .trim_end();

    NAIVE_LAYOUTS.iter().find_map(|layout| {
        NaiveDateTime::parse_from_str(naive, layout)
            .ok()
            .map(|dt| dt.and_utc().timestamp_micros())
    })
}
