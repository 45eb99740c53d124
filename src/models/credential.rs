// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit credential model.

use crate::time_utils::parse_utc_rfc3339;
use serde::{Deserialize, Serialize};

/// Credential as stored in Firestore (tokens encrypted with KMS).
///
/// A cleared credential keeps its document so `last_sync_at` survives
/// revocation, but carries no token material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Account ID (also used as document ID)
    pub account_id: u64,
    /// Encrypted access token (base64). Empty once cleared.
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64). `None` means re-authorization is
    /// needed once the access token expires.
    pub refresh_token_encrypted: Option<String>,
    /// When the access token expires (RFC3339)
    pub token_expiry: Option<String>,
    pub connected: bool,
    /// Start time of the last completed sync pass (RFC3339)
    pub last_sync_at: Option<String>,
    /// Granted OAuth scopes
    pub scopes: Vec<String>,
    pub updated_at: String,
}

impl StoredCredential {
    /// A credential is usable only if it is connected and holds an access token.
    pub fn is_usable(&self) -> bool {
        self.connected && !self.access_token_encrypted.is_empty()
    }

    /// Whether this credential holds a usable token expiring after `expiry`.
    pub fn outlives(&self, expiry: &str) -> bool {
        let Some(current) = self.token_expiry.as_deref() else {
            return false;
        };
        match (parse_utc_rfc3339(current), parse_utc_rfc3339(expiry)) {
            (Ok(current), Ok(expiry)) => self.is_usable() && current > expiry,
            _ => false,
        }
    }
}

/// Token fields written after a refresh. Other fields are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUpdate {
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub token_expiry: String,
}
