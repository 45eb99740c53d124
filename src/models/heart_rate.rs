// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily heart-rate record model.

use super::RecordSource;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily heart-rate summary. `min_bpm <= avg_bpm <= max_bpm` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyHeartRateRecord {
    pub account_id: u64,
    pub date: NaiveDate,
    /// Unweighted mean of all samples in the day
    pub avg_bpm: u32,
    pub min_bpm: u32,
    pub max_bpm: u32,
    pub sample_count: u32,
    pub source: RecordSource,
    pub provider_record_id: Option<String>,
    pub created_at: String,
}
