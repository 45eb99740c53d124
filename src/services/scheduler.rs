// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily sync of every connected account.
//!
//! The cron job calls [`SyncScheduler::run_once`], which fans out over the
//! connected accounts with bounded concurrency. A failing account is logged
//! and counted; it never stops the others and is not retried until the next
//! scheduled run.

use crate::db::HealthStore;
use crate::error::AppError;
use crate::models::{SyncRunStatus, SyncTrigger};
use crate::services::sync::SyncEngine;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to create scheduler: {0}")]
    CreationFailed(String),

    #[error("Failed to register job: {0}")]
    JobRegistrationFailed(String),

    #[error("Failed to start scheduler: {0}")]
    StartFailed(String),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first)
    pub cron_expression: String,
    /// Accounts synced at the same time
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 2 * * *".into(), // daily at 02:00 UTC
            concurrency: 4,
        }
    }
}

/// Counts from one scheduled run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduledRunSummary {
    pub accounts: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub not_authorized: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SyncScheduler {
    engine: SyncEngine,
    store: Arc<dyn HealthStore>,
    config: SchedulerConfig,
}

impl SyncScheduler {
    pub fn new(engine: SyncEngine, store: Arc<dyn HealthStore>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    /// Register the cron job and start the scheduler. Keep the returned
    /// handle alive for as long as jobs should fire.
    pub async fn start(&self) -> Result<JobScheduler, SchedulerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::CreationFailed(e.to_string()))?;

        let this = self.clone();
        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let this = this.clone();
            Box::pin(async move {
                match this.run_once().await {
                    Ok(summary) => tracing::debug!(?summary, "Scheduled sync finished"),
                    Err(e) => tracing::error!(error = %e, "Scheduled sync could not list accounts"),
                }
            })
        })
        .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::StartFailed(e.to_string()))?;

        tracing::info!(cron = %self.config.cron_expression, "Sync scheduler started");
        Ok(scheduler)
    }

    /// Sync every connected account once.
    pub async fn run_once(&self) -> Result<ScheduledRunSummary, AppError> {
        let accounts = self.store.list_connected_accounts().await?;
        tracing::info!(accounts = accounts.len(), "Starting scheduled Google Fit sync");

        let outcomes: Vec<_> = stream::iter(accounts)
            .map(|account_id| {
                let engine = self.engine.clone();
                async move {
                    let result = engine
                        .run_and_record(account_id, SyncTrigger::Scheduled)
                        .await;
                    (account_id, result)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = ScheduledRunSummary {
            accounts: outcomes.len(),
            ..Default::default()
        };

        for (account_id, result) in outcomes {
            match result {
                Ok(report) => match report.status() {
                    SyncRunStatus::Success => summary.succeeded += 1,
                    SyncRunStatus::Partial => summary.partial += 1,
                    _ => summary.failed += 1,
                },
                Err(AppError::NotAuthorized) => {
                    tracing::info!(account_id, "Skipping account that needs re-authorization");
                    summary.not_authorized += 1;
                }
                Err(e) => {
                    tracing::warn!(account_id, error = %e, "Scheduled sync failed for account");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            accounts = summary.accounts,
            succeeded = summary.succeeded,
            partial = summary.partial,
            not_authorized = summary.not_authorized,
            failed = summary.failed,
            "Scheduled Google Fit sync complete"
        );
        Ok(summary)
    }
}
