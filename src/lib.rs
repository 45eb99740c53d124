// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Somno-Sync: Google Fit sleep and heart-rate synchronization
//!
//! This crate provides the backend that connects an account to Google Fit,
//! keeps its OAuth credential alive, and pulls daily sleep and heart-rate
//! summaries into storage alongside manually entered records.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::HealthStore;
use services::{GoogleFitClient, RevocationService, SyncEngine, TokenManager};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn HealthStore>,
    pub google_fit: GoogleFitClient,
    pub tokens: TokenManager,
    pub sync: SyncEngine,
    pub revocation: RevocationService,
}

impl AppState {
    /// Wire the services together over one store and KMS handle.
    pub fn new(
        config: Config,
        store: Arc<dyn HealthStore>,
        kms: services::KmsService,
    ) -> Result<Self, error::AppError> {
        let google_fit = GoogleFitClient::new(&config)?;
        if !crate::config::SYNC_WINDOW_DAYS_RANGE.contains(&config.sync_window_days) {
            return Err(error::AppError::BadRequest(format!(
                "sync window of {} days is out of range",
                config.sync_window_days
            )));
        }

        let token_cache = Arc::new(dashmap::DashMap::new());
        let tokens = TokenManager::new(
            google_fit.clone(),
            store.clone(),
            kms,
            token_cache,
            chrono::Duration::hours(config.token_expiry_lookahead_hours),
        );

        // Sync and revocation share per-account locks
        let pass_locks = Arc::new(dashmap::DashMap::new());
        let sync = SyncEngine::new(
            google_fit.clone(),
            tokens.clone(),
            store.clone(),
            Arc::new(services::DurationStageScore),
            chrono::Duration::days(config.sync_window_days),
            pass_locks.clone(),
        );
        let revocation =
            RevocationService::new(google_fit.clone(), tokens.clone(), store.clone(), pass_locks);

        Ok(Self {
            config,
            store,
            google_fit,
            tokens,
            sync,
            revocation,
        })
    }
}
