// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth and Fitness API client.
//!
//! Handles:
//! - Authorization-code and refresh-token exchange
//! - Provider-side token revocation
//! - `dataset:aggregate` queries, decoded leniently into bucket wire types
//! - Error classification (transient vs. rejected vs. malformed)

use crate::config::Config;
use crate::error::AppError;
use crate::models::ReadingKind;
use crate::time_utils::instant_to_millis;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Day buckets, used for sleep segments.
pub const DAY_BUCKET_MILLIS: i64 = 86_400_000;
/// Hour buckets, used for heart-rate samples.
pub const HOUR_BUCKET_MILLIS: i64 = 3_600_000;

/// Google API client for one OAuth application.
#[derive(Clone)]
pub struct GoogleFitClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    revoke_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleFitClient {
    /// Create a client using the configured endpoints, credentials and timeout.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.google_fit_api_base.trim_end_matches('/').to_string(),
            token_url: config.google_token_url.clone(),
            revoke_url: config.google_revoke_url.clone(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
        })
    }

    /// Exchange an authorization code for the initial tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        self.post_token_form(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Google usually omits `refresh_token` in the response.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        self.post_token_form(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    /// Revoke a token at Google. Revoking a refresh token also revokes
    /// every access token minted from it.
    pub async fn revoke_token(&self, token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(&self.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(request_error)?;

        check_status(response).await?;
        tracing::info!("Google token revocation successful");
        Ok(())
    }

    /// Run one `dataset:aggregate` query for a single data type.
    pub async fn aggregate(
        &self,
        access_token: &str,
        kind: ReadingKind,
        bucket_millis: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AggregateResponse, AppError> {
        let url = format!("{}/users/me/dataset:aggregate", self.api_base);
        let body = AggregateRequest {
            aggregate_by: vec![AggregateBy {
                data_type_name: kind.data_type_name().to_string(),
            }],
            bucket_by_time: BucketByTime {
                duration_millis: bucket_millis,
            },
            start_time_millis: instant_to_millis(start),
            end_time_millis: instant_to_millis(end),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let value: serde_json::Value = check_response_json(response).await?;
        Ok(AggregateResponse::from_value(value))
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(request_error)?;

        check_response_json(response).await
    }
}

fn request_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::TransientProvider("request timed out".to_string())
    } else {
        AppError::TransientProvider(format!("request failed: {}", e.without_url()))
    }
}

/// Map a non-success status to an error. Bodies are logged, never returned.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let code = serde_json::from_str::<ProviderErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.into_code());

    tracing::warn!(status = status.as_u16(), error_code = ?code, "Google API request failed");
    tracing::debug!(body = %body, "Google API error body");

    if status.as_u16() == 429 || status.is_server_error() {
        return Err(AppError::TransientProvider(format!("HTTP {}", status.as_u16())));
    }

    Err(AppError::ProviderApi(match code {
        Some(code) => format!("HTTP {}: {}", status.as_u16(), code),
        None => format!("HTTP {}", status.as_u16()),
    }))
}

async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| AppError::MalformedResponse(format!("JSON parse error: {}", e)))
}

/// Error payload shapes used by Google's OAuth (`"error": "invalid_grant"`)
/// and REST (`"error": {"status": "..."}`) endpoints.
#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: ProviderErrorField,
}

#[derive(Deserialize, Default)]
#[serde(untagged)]
enum ProviderErrorField {
    Code(String),
    Status {
        #[serde(default)]
        status: Option<String>,
    },
    #[default]
    Missing,
}

impl ProviderErrorField {
    fn into_code(self) -> Option<String> {
        match self {
            ProviderErrorField::Code(code) => Some(code),
            ProviderErrorField::Status { status } => status,
            ProviderErrorField::Missing => None,
        }
    }
}

/// Token endpoint response (code exchange and refresh).
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub aggregate_by: Vec<AggregateBy>,
    pub bucket_by_time: BucketByTime,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateBy {
    pub data_type_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketByTime {
    pub duration_millis: i64,
}

/// `dataset:aggregate` response: bucket → dataset → point.
///
/// Every level decodes leniently. Missing or `null` lists become empty,
/// elements of the wrong shape are dropped with a warning, and timestamps
/// are accepted as strings or numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregateResponse {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub bucket: Vec<Bucket>,
}

impl AggregateResponse {
    /// Decode an arbitrary JSON value. Never fails.
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value(value) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected aggregate response shape, treating as empty");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub start_time_millis: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub end_time_millis: Option<i64>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub dataset: Vec<Dataset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dataset {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub point: Vec<DataPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub start_time_nanos: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub end_time_nanos: Option<i64>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub value: Vec<PointValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointValue {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub int_val: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fp_val: Option<f64>,
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => items,
        Some(serde_json::Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            tracing::warn!(found = %json_type(&other), "Expected array in aggregate response");
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed aggregate element");
                None
            }
        })
        .collect())
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
