// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment
//! (Cloud Run secret bindings), so there is a single loading path.

use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
pub const GOOGLE_FIT_API_BASE: &str = "https://www.googleapis.com/fitness/v1";

/// Accepted range for `SYNC_WINDOW_DAYS`.
pub const SYNC_WINDOW_DAYS_RANGE: RangeInclusive<i64> = 1..=365;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Frontend URL for post-authorization redirects
    pub frontend_url: String,
    /// Public base URL of this API (OAuth callback is built from it)
    pub api_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key ring location)
    pub gcp_region: String,
    /// Server port
    pub port: u16,

    // --- Provider endpoints (overridable for tests) ---
    pub google_auth_url: String,
    pub google_token_url: String,
    pub google_revoke_url: String,
    pub google_fit_api_base: String,

    // --- Sync tuning ---
    /// Trailing window for each sync pass, in days
    pub sync_window_days: i64,
    /// Cron expression (with seconds) for the daily scheduled run
    pub sync_cron: String,
    /// Max accounts synced concurrently by the scheduler
    pub sync_concurrency: usize,
    /// Tokens expiring within this many hours report `expiring_soon`
    pub token_expiry_lookahead_hours: i64,
    /// Timeout applied to every provider request
    pub provider_timeout_secs: u64,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
}

impl Config {
    /// Deterministic config for tests.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            google_auth_url: GOOGLE_AUTH_URL.to_string(),
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            google_revoke_url: GOOGLE_REVOKE_URL.to_string(),
            google_fit_api_base: GOOGLE_FIT_API_BASE.to_string(),
            sync_window_days: 30,
            sync_cron: "0 0 2 * * *".to_string(),
            sync_concurrency: 4,
            token_expiry_lookahead_hours: 24,
            provider_timeout_secs: 5,
            google_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: parsed("PORT", 8080)?,

            google_auth_url: env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| GOOGLE_AUTH_URL.to_string()),
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| GOOGLE_TOKEN_URL.to_string()),
            google_revoke_url: env::var("GOOGLE_REVOKE_URL")
                .unwrap_or_else(|_| GOOGLE_REVOKE_URL.to_string()),
            google_fit_api_base: env::var("GOOGLE_FIT_API_BASE")
                .unwrap_or_else(|_| GOOGLE_FIT_API_BASE.to_string()),

            sync_window_days: within(
                "SYNC_WINDOW_DAYS",
                parsed("SYNC_WINDOW_DAYS", 30)?,
                SYNC_WINDOW_DAYS_RANGE,
            )?,
            sync_cron: env::var("SYNC_CRON").unwrap_or_else(|_| "0 0 2 * * *".to_string()),
            sync_concurrency: parsed("SYNC_CONCURRENCY", 4)?,
            token_expiry_lookahead_hours: parsed("TOKEN_EXPIRY_LOOKAHEAD_HOURS", 24)?,
            provider_timeout_secs: parsed("PROVIDER_TIMEOUT_SECS", 30)?,

            google_client_secret: required("GOOGLE_CLIENT_SECRET")?.trim().to_string(),
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.trim().as_bytes().to_vec(),
        })
    }

    /// Redirect URI registered with Google for the authorization callback.
    pub fn oauth_callback_url(&self) -> String {
        format!(
            "{}/auth/google-fit/callback",
            self.api_url.trim_end_matches('/')
        )
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn within<T: PartialOrd + Display>(
    name: &'static str,
    value: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(name, value.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
