// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit OAuth authorization routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::SyncTrigger;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long an authorization `state` stays valid.
pub const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

/// Read-only scopes requested from Google Fit.
pub const GOOGLE_FIT_SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/fitness.activity.read",
    "https://www.googleapis.com/auth/fitness.sleep.read",
    "https://www.googleapis.com/auth/fitness.heart_rate.read",
    "https://www.googleapis.com/auth/fitness.body.read",
];

/// Session-protected route; merged with the API routes.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/google-fit/auth-url", get(auth_url))
}

/// Public route; Google redirects the browser here.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/google-fit/callback", get(auth_callback))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthUrlResponse {
    pub auth_url: String,
}

/// Build the Google consent URL for the signed-in account.
async fn auth_url(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AuthUrlResponse>> {
    let oauth_state = create_state(user.account_id, &state.config.oauth_state_key, now_millis()?)?;

    let auth_url = format!(
        "{}?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         access_type=offline&\
         prompt=consent&\
         scope={}&\
         state={}",
        state.config.google_auth_url,
        urlencoding::encode(&state.config.google_client_id),
        urlencoding::encode(&state.config.oauth_callback_url()),
        urlencoding::encode(&GOOGLE_FIT_SCOPES.join(" ")),
        oauth_state
    );

    tracing::info!(
        account_id = user.account_id,
        "Starting Google Fit authorization"
    );

    Ok(Json(AuthUrlResponse { auth_url }))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, store the credential, kick off
/// the first sync and send the browser back to settings.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let settings = format!("{}/settings", state.config.frontend_url);
    let fail = |code: &str| {
        Redirect::temporary(&format!(
            "{}?google_fit_error={}",
            settings,
            urlencoding::encode(code)
        ))
    };

    // Check for OAuth errors
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        return fail(&error);
    }

    let now = match now_millis() {
        Ok(now) => now,
        Err(_) => return fail("internal_error"),
    };
    let Some(account_id) = params
        .state
        .as_deref()
        .and_then(|s| verify_state(s, &state.config.oauth_state_key, now))
    else {
        tracing::warn!("Invalid, expired or tampered OAuth state");
        return fail("invalid_state");
    };
    let Some(code) = params.code else {
        return fail("missing_code");
    };

    tracing::info!(account_id, "Exchanging authorization code for tokens");

    let response = match state
        .google_fit
        .exchange_code(&code, &state.config.oauth_callback_url())
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(account_id, error = %e, "Authorization code exchange failed");
            return fail("token_exchange_failed");
        }
    };

    if let Err(e) = state.tokens.store_authorization(account_id, &response).await {
        tracing::error!(account_id, error = %e, "Failed to store Google Fit credential");
        return fail("storage_failed");
    }

    let sync = state.sync.clone();
    tokio::spawn(async move {
        if let Err(e) = sync.run_and_record(account_id, SyncTrigger::Initial).await {
            tracing::warn!(account_id, error = %e, "Initial Google Fit sync failed");
        }
    });

    Redirect::temporary(&format!("{}?google_fit=connected", settings))
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

fn sign(payload: &str, secret: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signed `state`: base64url("account_id|timestamp_hex|signature_hex").
pub fn create_state(account_id: u64, secret: &[u8], now_ms: u128) -> Result<String> {
    let payload = format!("{}|{:x}", account_id, now_ms);
    let signed = format!("{}|{}", payload, sign(&payload, secret)?);
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Verify signature and age of a `state` and return its account ID.
pub fn verify_state(state: &str, secret: &[u8], now_ms: u128) -> Option<u64> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    let mut parts = state_str.splitn(3, '|');
    let (account, timestamp_hex, signature_hex) = (parts.next()?, parts.next()?, parts.next()?);

    let expected = sign(&format!("{}|{}", account, timestamp_hex), secret).ok()?;
    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued) > STATE_MAX_AGE_MS || issued > now_ms {
        tracing::warn!("OAuth state expired");
        return None;
    }

    account.parse().ok()
}
