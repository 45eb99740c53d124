// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Disconnect an account from Google Fit and purge provider-sourced data.

use crate::db::HealthStore;
use crate::error::AppError;
use crate::models::{AuditAction, AuditEvent};
use crate::services::google_fit::GoogleFitClient;
use crate::services::token::{account_lock, AccountLocks, TokenManager};
use crate::time_utils::format_utc_rfc3339;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct RevocationReport {
    pub removed_sleep_records: usize,
    pub removed_heart_rate_records: usize,
    pub revoked_at: String,
}

#[derive(Clone)]
pub struct RevocationService {
    client: GoogleFitClient,
    tokens: TokenManager,
    store: Arc<dyn HealthStore>,
    pass_locks: AccountLocks,
}

impl RevocationService {
    /// `pass_locks` must be the set the sync engine uses, so a revoke waits
    /// for an in-flight pass and a pass started afterwards finds no token.
    pub fn new(
        client: GoogleFitClient,
        tokens: TokenManager,
        store: Arc<dyn HealthStore>,
        pass_locks: AccountLocks,
    ) -> Self {
        Self {
            client,
            tokens,
            store,
            pass_locks,
        }
    }

    /// Clear tokens, then delete every provider-sourced sleep and heart-rate
    /// record for the account. Manual records are never touched.
    ///
    /// Revoking at Google is best-effort; local disconnection proceeds even
    /// when the call fails.
    pub async fn revoke(&self, account_id: u64) -> Result<RevocationReport, AppError> {
        let lock = account_lock(&self.pass_locks, account_id);
        let _guard = lock.lock().await;

        match self.tokens.revocable_token(account_id).await {
            Ok(Some(token)) => {
                if let Err(e) = self.client.revoke_token(&token).await {
                    tracing::warn!(account_id, error = %e, "Google token revoke failed, continuing");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(account_id, error = %e, "Could not decrypt token for revoke, continuing");
            }
        }

        self.tokens.invalidate(account_id);
        self.store.clear_credential(account_id).await?;
        self.tokens.invalidate(account_id);

        let revoked_at = format_utc_rfc3339(Utc::now());
        self.audit(
            account_id,
            AuditAction::RevokeGoogleFitAccess,
            &revoked_at,
            serde_json::json!({}),
        )
        .await;

        let removed_sleep_records = self.store.delete_provider_sleep_records(account_id).await?;
        let removed_heart_rate_records = self
            .store
            .delete_provider_heart_rate_records(account_id)
            .await?;

        self.audit(
            account_id,
            AuditAction::DeleteGoogleFitData,
            &format_utc_rfc3339(Utc::now()),
            serde_json::json!({
                "removed_sleep_records": removed_sleep_records,
                "removed_heart_rate_records": removed_heart_rate_records,
            }),
        )
        .await;

        tracing::info!(
            account_id,
            removed_sleep_records,
            removed_heart_rate_records,
            "Google Fit access revoked"
        );

        Ok(RevocationReport {
            removed_sleep_records,
            removed_heart_rate_records,
            revoked_at,
        })
    }

    async fn audit(
        &self,
        account_id: u64,
        action: AuditAction,
        at: &str,
        details: serde_json::Value,
    ) {
        let event = AuditEvent {
            account_id,
            action,
            at: at.to_string(),
            details,
        };
        if let Err(e) = self.store.insert_audit_event(&event).await {
            tracing::error!(account_id, action = ?action, error = %e, "Failed to write audit event");
        }
    }
}
