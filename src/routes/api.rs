// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{SyncRun, SyncRunStatus, SyncTrigger};
use crate::services::{SyncReport, TokenStatus};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_HISTORY_LIMIT: u32 = 10;
const MAX_HISTORY_LIMIT: u32 = 50;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/google-fit/status", get(get_status))
        .route("/api/google-fit/token-status", get(get_token_status))
        .route("/api/google-fit/sync", post(sync_now))
        .route("/api/google-fit/connection", delete(revoke_connection))
        .route("/api/google-fit/sync-history", get(get_sync_history))
}

// ─── Status ──────────────────────────────────────────────────

/// Connection summary for the settings page.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StatusResponse {
    pub connected: bool,
    pub last_sync_at: Option<String>,
    /// Status of the most recent sync run, if any
    pub sync_status: Option<SyncRunStatus>,
}

async fn get_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<StatusResponse>> {
    let credential = state.store.get_credential(user.account_id).await?;
    let latest = state.store.list_sync_runs(user.account_id, 1).await?;

    Ok(Json(StatusResponse {
        connected: credential.as_ref().is_some_and(|c| c.connected),
        last_sync_at: credential.and_then(|c| c.last_sync_at),
        sync_status: latest.first().map(|r| r.status),
    }))
}

async fn get_token_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TokenStatus>> {
    Ok(Json(state.tokens.status(user.account_id).await?))
}

// ─── Sync ────────────────────────────────────────────────────

/// Result of a manual sync pass.
///
/// `incomplete` is the soft signal for a partial pass; `failed_kinds`
/// names the data kinds that did not sync.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncNowResponse {
    pub status: SyncRunStatus,
    pub incomplete: bool,
    pub failed_kinds: Vec<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "binding-generation", ts(flatten))]
    pub report: SyncReport,
}

impl From<SyncReport> for SyncNowResponse {
    fn from(report: SyncReport) -> Self {
        let status = report.status();
        Self {
            status,
            incomplete: status != SyncRunStatus::Success,
            failed_kinds: report
                .failed_kinds()
                .into_iter()
                .map(str::to_string)
                .collect(),
            report,
        }
    }
}

/// Run a sync pass now.
///
/// A partial pass still returns 200 with the per-kind counts and
/// `incomplete: true`; only re-authorization and whole-pass failures are
/// errors.
async fn sync_now(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyncNowResponse>> {
    let report = state
        .sync
        .run_and_record(user.account_id, SyncTrigger::Manual)
        .await?;

    match report.status() {
        SyncRunStatus::TransientError => Err(AppError::TransientProvider(
            "Google Fit unavailable".to_string(),
        )),
        SyncRunStatus::Failed => Err(AppError::ProviderApi(
            "Google Fit request failed".to_string(),
        )),
        _ => Ok(Json(report.into())),
    }
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: u32,
}

fn default_history_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// Most recent sync runs, newest first.
async fn get_sync_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SyncRun>>> {
    let limit = query.limit.clamp(1, MAX_HISTORY_LIMIT);
    Ok(Json(
        state.store.list_sync_runs(user.account_id, limit).await?,
    ))
}

// ─── Revocation ──────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RevokeResponse {
    pub success: bool,
    pub removed_sleep_records: usize,
    pub removed_heart_rate_records: usize,
}

/// Disconnect Google Fit and delete provider-sourced data.
async fn revoke_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RevokeResponse>> {
    let report = state.revocation.revoke(user.account_id).await?;

    Ok(Json(RevokeResponse {
        success: true,
        removed_sleep_records: report.removed_sleep_records,
        removed_heart_rate_records: report.removed_heart_rate_records,
    }))
}
