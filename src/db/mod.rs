// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer.
//!
//! `HealthStore` is the seam between the sync engine and persistence.
//! `FirestoreDb` is the production backend; `MemoryStore` backs tests and
//! offline development.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{
    AuditEvent, DailyHeartRateRecord, DailySleepRecord, RecordSource, StoredCredential, SyncRun,
    TokenUpdate,
};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    pub const CREDENTIALS: &str = "google_fit_credentials";
    pub const SLEEP_RECORDS: &str = "sleep_records";
    pub const HEART_RATE_RECORDS: &str = "heart_rate_records";
    pub const SYNC_RUNS: &str = "google_fit_sync_runs";
    pub const AUDIT_EVENTS: &str = "audit_events";
}

/// Document ID for a daily record. Uniqueness on this key enforces one row
/// per `(account, date, source)`.
pub fn daily_record_id(account_id: u64, date: NaiveDate, source: RecordSource) -> String {
    format!(
        "{}_{}_{}",
        account_id,
        date.format("%Y-%m-%d"),
        source.as_str()
    )
}

/// Persistence operations used by the sync engine.
///
/// Inserts of daily records must fail with `AppError::StorageConflict` when
/// a record with the same `(account, date, source)` already exists.
#[async_trait]
pub trait HealthStore: Send + Sync {
    // ─── Credentials ─────────────────────────────────────────────

    async fn get_credential(&self, account_id: u64) -> Result<Option<StoredCredential>, AppError>;

    /// Create or replace the whole credential document.
    async fn put_credential(&self, credential: &StoredCredential) -> Result<(), AppError>;

    /// Write refreshed token fields only, unless the stored credential already
    /// holds a usable token that expires later. The check and the write are
    /// atomic. Returns whether the update was written.
    async fn update_credential_tokens(
        &self,
        account_id: u64,
        update: &TokenUpdate,
    ) -> Result<bool, AppError>;

    /// Erase token material and mark the credential disconnected.
    async fn clear_credential(&self, account_id: u64) -> Result<(), AppError>;

    async fn set_last_sync_at(&self, account_id: u64, at: &str) -> Result<(), AppError>;

    async fn list_connected_accounts(&self) -> Result<Vec<u64>, AppError>;

    // ─── Daily Sleep Records ─────────────────────────────────────

    async fn get_sleep_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailySleepRecord>, AppError>;

    async fn insert_sleep_record(&self, record: &DailySleepRecord) -> Result<(), AppError>;

    async fn list_sleep_records(&self, account_id: u64) -> Result<Vec<DailySleepRecord>, AppError>;

    /// Delete every provider-sourced sleep record. Returns the count removed.
    async fn delete_provider_sleep_records(&self, account_id: u64) -> Result<usize, AppError>;

    // ─── Daily Heart-Rate Records ────────────────────────────────

    async fn get_heart_rate_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError>;

    async fn insert_heart_rate_record(&self, record: &DailyHeartRateRecord)
        -> Result<(), AppError>;

    async fn list_heart_rate_records(
        &self,
        account_id: u64,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError>;

    async fn delete_provider_heart_rate_records(&self, account_id: u64)
        -> Result<usize, AppError>;

    // ─── Sync History & Audit ────────────────────────────────────

    async fn insert_sync_run(&self, run: &SyncRun) -> Result<(), AppError>;

    /// Most recent runs first.
    async fn list_sync_runs(&self, account_id: u64, limit: u32) -> Result<Vec<SyncRun>, AppError>;

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError>;
}
