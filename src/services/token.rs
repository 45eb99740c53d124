// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit token lifecycle.
//!
//! Decides whether a stored credential is usable, refreshes expired access
//! tokens, and keeps an in-memory cache of decrypted access tokens that is
//! invalidated on every credential write.

use crate::db::HealthStore;
use crate::error::AppError;
use crate::models::{StoredCredential, TokenUpdate};
use crate::services::google_fit::{GoogleFitClient, TokenResponse};
use crate::services::kms::{decrypt_token, encrypt_tokens, KmsService};
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Token state, computed on read from the stored expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// No credential, or it was cleared
    Disconnected,
    Valid,
    /// Valid, but expires within the lookahead window. Informational only.
    ExpiringSoon,
    /// `now >= expiry`; the next use will try a refresh
    Expired,
}

impl TokenState {
    pub fn evaluate(
        credential: Option<&StoredCredential>,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> Self {
        let Some(credential) = credential.filter(|c| c.is_usable()) else {
            return TokenState::Disconnected;
        };
        let Some(expiry) = credential
            .token_expiry
            .as_deref()
            .and_then(|e| parse_utc_rfc3339(e).ok())
        else {
            return TokenState::Disconnected;
        };

        if now >= expiry {
            TokenState::Expired
        } else if expiry - now <= lookahead {
            TokenState::ExpiringSoon
        } else {
            TokenState::Valid
        }
    }
}

/// Token status for display.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TokenStatus {
    pub state: TokenState,
    pub connected: bool,
    pub token_expiry: Option<String>,
    /// Whole hours until expiry; negative once expired
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub hours_until_expiry: Option<i64>,
    pub last_sync_at: Option<String>,
}

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache type for use in AppState.
pub type TokenCache = Arc<DashMap<u64, CachedToken>>;

/// Per-account mutexes (token refresh, sync pass).
pub type AccountLocks = Arc<DashMap<u64, Arc<Mutex<()>>>>;

/// Get (or create) the mutex for one account.
pub fn account_lock(locks: &AccountLocks, account_id: u64) -> Arc<Mutex<()>> {
    locks
        .entry(account_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Owns the credential lifecycle for every account.
#[derive(Clone)]
pub struct TokenManager {
    client: GoogleFitClient,
    store: Arc<dyn HealthStore>,
    kms: KmsService,
    /// Decrypted access tokens, shared across requests.
    token_cache: TokenCache,
    /// Serializes refreshes per account.
    refresh_locks: AccountLocks,
    lookahead: Duration,
}

impl TokenManager {
    pub fn new(
        client: GoogleFitClient,
        store: Arc<dyn HealthStore>,
        kms: KmsService,
        token_cache: TokenCache,
        lookahead: Duration,
    ) -> Self {
        Self {
            client,
            store,
            kms,
            token_cache,
            refresh_locks: Arc::new(DashMap::new()),
            lookahead,
        }
    }

    /// Drop any cached access token for the account.
    pub fn invalidate(&self, account_id: u64) {
        self.token_cache.remove(&account_id);
    }

    /// Return a usable access token, refreshing it if expired.
    ///
    /// `Ok(None)` means the account must re-authorize, or the refresh failed
    /// and the next attempt may succeed; the stored credential is left
    /// untouched in both cases. `Err` is reserved for storage and KMS failures.
    pub async fn get_valid_access_token(&self, account_id: u64) -> Result<Option<String>, AppError> {
        if let Some(token) = self.cached(account_id, Utc::now()) {
            return Ok(Some(token));
        }

        let lock = account_lock(&self.refresh_locks, account_id);
        let _guard = lock.lock().await;

        // Another task may have refreshed while we waited.
        let now = Utc::now();
        if let Some(token) = self.cached(account_id, now) {
            return Ok(Some(token));
        }

        let Some(stored) = self.store.get_credential(account_id).await? else {
            tracing::debug!(account_id, "No Google Fit credential");
            return Ok(None);
        };

        match TokenState::evaluate(Some(&stored), now, self.lookahead) {
            TokenState::Disconnected => {
                tracing::debug!(account_id, "Google Fit credential is disconnected");
                Ok(None)
            }
            TokenState::Valid | TokenState::ExpiringSoon => {
                let access_token =
                    decrypt_token(&self.kms, &stored.access_token_encrypted, account_id).await?;
                let expires_at = stored_expiry(&stored)?;
                self.cache(account_id, &access_token, expires_at);
                Ok(Some(access_token))
            }
            TokenState::Expired => self.refresh(account_id, &stored).await,
        }
    }

    async fn refresh(
        &self,
        account_id: u64,
        stored: &StoredCredential,
    ) -> Result<Option<String>, AppError> {
        let Some(encrypted_refresh) = stored.refresh_token_encrypted.as_deref() else {
            tracing::warn!(
                account_id,
                "Access token expired and no refresh token stored, re-authorization required"
            );
            return Ok(None);
        };

        tracing::info!(account_id, "Access token expired, refreshing");
        let refresh_token = decrypt_token(&self.kms, encrypted_refresh, account_id).await?;

        let response = match self.client.refresh_token(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(account_id, error = %e, "Token refresh failed, credential kept");
                return Ok(None);
            }
        };

        let new_expiry = expiry_from(&response, Utc::now());

        let (access_encrypted, new_refresh_encrypted) = encrypt_tokens(
            &self.kms,
            &response.access_token,
            response.refresh_token.as_deref(),
            account_id,
        )
        .await?;

        let update = TokenUpdate {
            access_token_encrypted: access_encrypted,
            refresh_token_encrypted: new_refresh_encrypted
                .or_else(|| stored.refresh_token_encrypted.clone()),
            token_expiry: format_utc_rfc3339(new_expiry),
        };

        self.invalidate(account_id);
        if !self.store.update_credential_tokens(account_id, &update).await? {
            // Another instance stored a later token in the meantime.
            return self.use_stored_token(account_id).await;
        }
        self.cache(account_id, &response.access_token, new_expiry);

        tracing::info!(account_id, "Token refreshed and cached");
        Ok(Some(response.access_token))
    }

    async fn use_stored_token(&self, account_id: u64) -> Result<Option<String>, AppError> {
        let Some(current) = self
            .store
            .get_credential(account_id)
            .await?
            .filter(|c| c.is_usable())
        else {
            return Ok(None);
        };

        tracing::info!(account_id, "Newer token already stored, keeping it");
        let access_token =
            decrypt_token(&self.kms, &current.access_token_encrypted, account_id).await?;
        self.cache(account_id, &access_token, stored_expiry(&current)?);
        Ok(Some(access_token))
    }

    /// Store the credential produced by the authorization-code exchange.
    ///
    /// Keeps a previously stored refresh token when Google does not return
    /// a new one.
    pub async fn store_authorization(
        &self,
        account_id: u64,
        response: &TokenResponse,
    ) -> Result<(), AppError> {
        if response.access_token.is_empty() {
            return Err(AppError::MalformedResponse(
                "token response has an empty access_token".to_string(),
            ));
        }

        let now = Utc::now();
        let existing = self.store.get_credential(account_id).await?;

        let (access_encrypted, new_refresh_encrypted) = encrypt_tokens(
            &self.kms,
            &response.access_token,
            response.refresh_token.as_deref(),
            account_id,
        )
        .await?;

        let refresh_token_encrypted = new_refresh_encrypted.or_else(|| {
            existing
                .as_ref()
                .and_then(|c| c.refresh_token_encrypted.clone())
        });

        let scopes = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let credential = StoredCredential {
            account_id,
            access_token_encrypted: access_encrypted,
            refresh_token_encrypted,
            token_expiry: Some(format_utc_rfc3339(expiry_from(response, now))),
            connected: true,
            last_sync_at: existing.and_then(|c| c.last_sync_at),
            scopes,
            updated_at: format_utc_rfc3339(now),
        };

        self.invalidate(account_id);
        self.store.put_credential(&credential).await?;

        tracing::info!(
            account_id,
            has_refresh_token = credential.refresh_token_encrypted.is_some(),
            "Google Fit credential stored"
        );
        Ok(())
    }

    /// Decrypt the token to hand to Google's revoke endpoint, preferring the
    /// refresh token.
    pub async fn revocable_token(&self, account_id: u64) -> Result<Option<String>, AppError> {
        let Some(stored) = self.store.get_credential(account_id).await? else {
            return Ok(None);
        };

        let encrypted = match stored.refresh_token_encrypted.as_deref() {
            Some(refresh) => refresh,
            None if !stored.access_token_encrypted.is_empty() => &stored.access_token_encrypted,
            None => return Ok(None),
        };

        decrypt_token(&self.kms, encrypted, account_id)
            .await
            .map(Some)
    }

    /// Current token state for display.
    pub async fn status(&self, account_id: u64) -> Result<TokenStatus, AppError> {
        let now = Utc::now();
        let stored = self.store.get_credential(account_id).await?;
        let state = TokenState::evaluate(stored.as_ref(), now, self.lookahead);

        let hours_until_expiry = match state {
            TokenState::Disconnected => None,
            _ => stored
                .as_ref()
                .and_then(|c| c.token_expiry.as_deref())
                .and_then(|e| parse_utc_rfc3339(e).ok())
                .map(|expiry| (expiry - now).num_hours()),
        };

        Ok(TokenStatus {
            state,
            connected: stored.as_ref().is_some_and(|c| c.connected),
            token_expiry: stored.as_ref().and_then(|c| c.token_expiry.clone()),
            hours_until_expiry,
            last_sync_at: stored.and_then(|c| c.last_sync_at),
        })
    }

    fn cached(&self, account_id: u64, now: DateTime<Utc>) -> Option<String> {
        self.token_cache
            .get(&account_id)
            .filter(|cached| now < cached.expires_at)
            .map(|cached| cached.access_token.clone())
    }

    fn cache(&self, account_id: u64, access_token: &str, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            account_id,
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }
}

fn stored_expiry(stored: &StoredCredential) -> Result<DateTime<Utc>, AppError> {
    let expiry = stored
        .token_expiry
        .as_deref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Credential has no expiry")))?;
    parse_utc_rfc3339(expiry)
}

fn expiry_from(response: &TokenResponse, now: DateTime<Utc>) -> DateTime<Utc> {
    let secs = response
        .expires_in
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    now + Duration::seconds(secs)
}
