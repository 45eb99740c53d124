// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync history model.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// What started a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// "Sync now" from the user
    Manual,
    /// Daily scheduler
    Scheduled,
    /// First pass right after authorization
    Initial,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Success,
    /// One data kind failed, the other was stored
    Partial,
    NotAuthorized,
    TransientError,
    Failed,
}

/// Sync history entry stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub account_id: u64,
    pub trigger: SyncTrigger,
    pub status: SyncRunStatus,
    pub synced_sleep_count: u32,
    pub synced_heart_rate_count: u32,
    pub error_message: Option<String>,
    /// RFC3339, seconds precision so it sorts lexically
    pub started_at: String,
    pub duration_ms: u64,
}
