// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod audit;
pub mod credential;
pub mod heart_rate;
pub mod reading;
pub mod sleep;
pub mod sync_run;

pub use audit::{AuditAction, AuditEvent};
pub use credential::{StoredCredential, TokenUpdate};
pub use heart_rate::DailyHeartRateRecord;
pub use reading::{
    ActivitySegment, ActivityType, HeartRateSample, Reading, ReadingKind, SleepSegment,
    SleepStage, StepReading,
};
pub use sleep::DailySleepRecord;
pub use sync_run::{SyncRun, SyncRunStatus, SyncTrigger};

use serde::{Deserialize, Serialize};

/// Origin of a daily record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Entered by the user through the CRUD layer. Never touched by sync.
    Manual,
    /// Written by the sync engine from Google Fit data.
    Provider,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Manual => "manual",
            RecordSource::Provider => "provider",
        }
    }
}
