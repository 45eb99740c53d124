// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily sleep record model.

use super::RecordSource;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One night of sleep, keyed by `(account_id, date, source)`.
///
/// Durations are whole minutes. The stage durations never sum to more than
/// `total_minutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySleepRecord {
    pub account_id: u64,
    /// Calendar date (UTC) the sleep started on
    pub date: NaiveDate,
    pub total_minutes: u32,
    pub deep_minutes: u32,
    pub rem_minutes: u32,
    pub light_minutes: u32,
    pub awake_minutes: u32,
    /// Stage shares of total, in whole percent
    pub deep_percent: u32,
    pub rem_percent: u32,
    pub light_percent: u32,
    pub awake_percent: u32,
    /// (total - awake) / total, in whole percent
    pub sleep_efficiency: u32,
    pub sleep_score: Option<u32>,
    pub source: RecordSource,
    /// `"{start_ms}-{end_ms}"` of the segments the record was built from
    pub provider_record_id: Option<String>,
    pub created_at: String,
}
