// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time conversion and formatting.

use crate::error::AppError;
use chrono::{DateTime, SecondsFormat, Utc};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored RFC3339 timestamp back into UTC.
pub fn parse_utc_rfc3339(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse timestamp: {}", e)))
}

/// Convert provider nanoseconds-since-epoch to a millisecond-resolution instant.
pub fn nanos_to_instant(nanos: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(nanos / NANOS_PER_MILLI)
}

/// Milliseconds since epoch, as the provider's query parameters expect.
pub fn instant_to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}
