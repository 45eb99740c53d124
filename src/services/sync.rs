// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One Google Fit synchronization pass per account.
//!
//! A pass obtains a valid access token, fetches sleep and heart-rate data
//! for the trailing window of completed UTC days, folds it into daily
//! records and inserts the ones that are not stored yet. The current day is
//! left for a later pass, since a stored day is never rewritten. Sleep and
//! heart rate are fetched and stored independently; a failure in one kind
//! is reported alongside the other kind's results.

use crate::db::HealthStore;
use crate::error::AppError;
use crate::models::{
    DailyHeartRateRecord, DailySleepRecord, ReadingKind, RecordSource, SyncRun, SyncRunStatus,
    SyncTrigger,
};
use crate::services::daily::{daily_heart_rate_records, daily_sleep_records, SleepScorePolicy};
use crate::services::fit_parser::{parse_heart_rate, parse_sleep_segments};
use crate::services::google_fit::{GoogleFitClient, DAY_BUCKET_MILLIS, HOUR_BUCKET_MILLIS};
use crate::services::token::{account_lock, AccountLocks, TokenManager};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Result of syncing one data kind.
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct KindOutcome {
    /// New provider-sourced rows written
    pub synced: u32,
    /// Days skipped because a manual or provider record already existed
    pub skipped: u32,
    /// Set when this kind failed; the message never contains provider bodies
    #[serde(skip)]
    pub error: Option<KindFailure>,
}

#[derive(Debug, Clone)]
pub struct KindFailure {
    pub transient: bool,
    pub message: String,
}

impl KindFailure {
    fn from_error(e: &AppError) -> Self {
        Self {
            transient: e.is_transient(),
            message: e.to_string(),
        }
    }
}

impl KindOutcome {
    fn failed(e: &AppError) -> Self {
        Self {
            error: Some(KindFailure::from_error(e)),
            ..Default::default()
        }
    }

    /// Count one stored candidate, or record the error that stopped the kind.
    /// Returns false once the kind has failed.
    fn tally(&mut self, stored: Result<bool, AppError>) -> bool {
        match stored {
            Ok(true) => self.synced += 1,
            Ok(false) => self.skipped += 1,
            Err(e) => {
                self.error = Some(KindFailure::from_error(&e));
                return false;
            }
        }
        true
    }
}

/// Report of a completed pass (possibly partial).
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncReport {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub account_id: u64,
    pub started_at: String,
    pub sleep: KindOutcome,
    pub heart_rate: KindOutcome,
}

impl SyncReport {
    pub fn synced_sleep_count(&self) -> u32 {
        self.sleep.synced
    }

    pub fn synced_heart_rate_count(&self) -> u32 {
        self.heart_rate.synced
    }

    /// Success when both kinds succeeded, partial when one did.
    pub fn status(&self) -> SyncRunStatus {
        match (&self.sleep.error, &self.heart_rate.error) {
            (None, None) => SyncRunStatus::Success,
            (Some(_), None) | (None, Some(_)) => SyncRunStatus::Partial,
            (Some(a), Some(b)) if a.transient && b.transient => SyncRunStatus::TransientError,
            (Some(_), Some(_)) => SyncRunStatus::Failed,
        }
    }

    /// Data kinds that did not sync.
    pub fn failed_kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        if self.sleep.error.is_some() {
            kinds.push(ReadingKind::Sleep.as_str());
        }
        if self.heart_rate.error.is_some() {
            kinds.push(ReadingKind::HeartRate.as_str());
        }
        kinds
    }

    fn error_message(&self) -> Option<String> {
        let messages: Vec<String> = [
            (ReadingKind::Sleep, &self.sleep.error),
            (ReadingKind::HeartRate, &self.heart_rate.error),
        ]
        .into_iter()
        .filter_map(|(kind, err)| {
            err.as_ref()
                .map(|e| format!("{}: {}", kind.as_str(), e.message))
        })
        .collect();

        (!messages.is_empty()).then(|| messages.join("; "))
    }
}

/// Orchestrates sync passes. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    client: GoogleFitClient,
    tokens: TokenManager,
    store: Arc<dyn HealthStore>,
    policy: Arc<dyn SleepScorePolicy>,
    window: Duration,
    /// Per-account pass serialization, shared with revocation.
    pass_locks: AccountLocks,
}

impl SyncEngine {
    pub fn new(
        client: GoogleFitClient,
        tokens: TokenManager,
        store: Arc<dyn HealthStore>,
        policy: Arc<dyn SleepScorePolicy>,
        window: Duration,
        pass_locks: AccountLocks,
    ) -> Self {
        Self {
            client,
            tokens,
            store,
            policy,
            window,
            pass_locks,
        }
    }

    /// Sync the configured trailing window.
    pub async fn sync_account(&self, account_id: u64) -> Result<SyncReport, AppError> {
        self.sync_account_window(account_id, self.window).await
    }

    /// Sync the completed UTC days in `[now - window, now]`.
    ///
    /// A second call for an account that is mid-pass waits for the first
    /// pass to finish, then runs (and usually finds nothing new).
    pub async fn sync_account_window(
        &self,
        account_id: u64,
        window: Duration,
    ) -> Result<SyncReport, AppError> {
        let lock = account_lock(&self.pass_locks, account_id);
        let _guard = lock.lock().await;

        let started_at = Utc::now();
        let access_token = self
            .tokens
            .get_valid_access_token(account_id)
            .await?
            .ok_or(AppError::NotAuthorized)?;

        let (start, end) = completed_days(started_at, window);
        let created_at = format_utc_rfc3339(started_at);

        let (sleep, heart_rate) = tokio::join!(
            self.sync_sleep(account_id, &access_token, start, end, &created_at),
            self.sync_heart_rate(account_id, &access_token, start, end, &created_at),
        );

        let sleep = sleep.unwrap_or_else(|e| KindOutcome::failed(&e));
        let heart_rate = heart_rate.unwrap_or_else(|e| KindOutcome::failed(&e));
        for (kind, outcome) in [("sleep", &sleep), ("heart_rate", &heart_rate)] {
            if let Some(failure) = &outcome.error {
                tracing::warn!(
                    account_id,
                    kind,
                    synced = outcome.synced,
                    error = %failure.message,
                    "Google Fit sync failed for data kind"
                );
            }
        }

        self.store
            .set_last_sync_at(account_id, &created_at)
            .await?;

        let report = SyncReport {
            account_id,
            started_at: created_at,
            sleep,
            heart_rate,
        };

        tracing::info!(
            account_id,
            status = ?report.status(),
            synced_sleep = report.sleep.synced,
            skipped_sleep = report.sleep.skipped,
            synced_heart_rate = report.heart_rate.synced,
            skipped_heart_rate = report.heart_rate.skipped,
            "Google Fit sync pass complete"
        );

        Ok(report)
    }

    /// Run a pass and append its outcome to the sync history.
    pub async fn run_and_record(
        &self,
        account_id: u64,
        trigger: SyncTrigger,
    ) -> Result<SyncReport, AppError> {
        let started = Instant::now();
        let started_at = format_utc_rfc3339(Utc::now());
        let result = self.sync_account(account_id).await;

        let run = match &result {
            Ok(report) => SyncRun {
                account_id,
                trigger,
                status: report.status(),
                synced_sleep_count: report.synced_sleep_count(),
                synced_heart_rate_count: report.synced_heart_rate_count(),
                error_message: report.error_message(),
                started_at: report.started_at.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => SyncRun {
                account_id,
                trigger,
                status: match e {
                    AppError::NotAuthorized => SyncRunStatus::NotAuthorized,
                    e if e.is_transient() => SyncRunStatus::TransientError,
                    _ => SyncRunStatus::Failed,
                },
                synced_sleep_count: 0,
                synced_heart_rate_count: 0,
                error_message: Some(e.to_string()),
                started_at,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        };

        if let Err(e) = self.store.insert_sync_run(&run).await {
            tracing::warn!(account_id, error = %e, "Failed to record sync run");
        }

        result
    }

    async fn sync_sleep(
        &self,
        account_id: u64,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        created_at: &str,
    ) -> Result<KindOutcome, AppError> {
        let response = self
            .client
            .aggregate(access_token, ReadingKind::Sleep, DAY_BUCKET_MILLIS, start, end)
            .await?;
        let segments = parse_sleep_segments(Some(&response));
        let candidates =
            daily_sleep_records(account_id, &segments, self.policy.as_ref(), created_at)
                .into_iter()
                .filter(|r| in_range(r.date, start, end));

        let mut outcome = KindOutcome::default();
        for record in candidates {
            if !outcome.tally(self.store_sleep(&record).await) {
                break;
            }
        }
        Ok(outcome)
    }

    async fn sync_heart_rate(
        &self,
        account_id: u64,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        created_at: &str,
    ) -> Result<KindOutcome, AppError> {
        let response = self
            .client
            .aggregate(
                access_token,
                ReadingKind::HeartRate,
                HOUR_BUCKET_MILLIS,
                start,
                end,
            )
            .await?;
        let samples = parse_heart_rate(Some(&response));
        let candidates = daily_heart_rate_records(account_id, &samples, created_at)
            .into_iter()
            .filter(|r| in_range(r.date, start, end));

        let mut outcome = KindOutcome::default();
        for record in candidates {
            if !outcome.tally(self.store_heart_rate(&record).await) {
                break;
            }
        }
        Ok(outcome)
    }

    /// Insert unless any record (manual or provider) exists for the day.
    /// Returns whether a row was written.
    async fn store_sleep(&self, record: &DailySleepRecord) -> Result<bool, AppError> {
        let existing = self
            .store
            .get_sleep_records_for_day(record.account_id, record.date)
            .await?;
        if let Some(found) = existing.first() {
            log_skip(record.account_id, "sleep", record.date, found.source);
            return Ok(false);
        }
        insert_or_already_synced(self.store.insert_sleep_record(record).await)
    }

    async fn store_heart_rate(&self, record: &DailyHeartRateRecord) -> Result<bool, AppError> {
        let existing = self
            .store
            .get_heart_rate_records_for_day(record.account_id, record.date)
            .await?;
        if let Some(found) = existing.first() {
            log_skip(record.account_id, "heart_rate", record.date, found.source);
            return Ok(false);
        }
        insert_or_already_synced(self.store.insert_heart_rate_record(record).await)
    }
}

/// Midnight-aligned `[start, end)` covering the completed UTC days of the
/// window. `end` is the start of the current day.
pub fn completed_days(now: DateTime<Utc>, window: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = |date: NaiveDate| date.and_time(NaiveTime::MIN).and_utc();
    let end = midnight(now.date_naive());
    let start = midnight((now - window).date_naive());
    (start.min(end), end)
}

fn in_range(date: NaiveDate, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    date >= start.date_naive() && date < end.date_naive()
}

fn log_skip(account_id: u64, kind: &str, date: chrono::NaiveDate, existing: RecordSource) {
    tracing::debug!(
        account_id,
        kind,
        date = %date,
        existing_source = existing.as_str(),
        "Record already present for day, skipping"
    );
}

/// A duplicate-key failure means another pass stored the row first.
fn insert_or_already_synced(result: Result<(), AppError>) -> Result<bool, AppError> {
    match result {
        Ok(()) => Ok(true),
        Err(AppError::StorageConflict(key)) => {
            tracing::debug!(key = %key, "Concurrent insert won, treating as already synced");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
