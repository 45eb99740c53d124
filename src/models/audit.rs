// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audit log entries for destructive operations.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RevokeGoogleFitAccess,
    DeleteGoogleFitData,
}

/// Audit log entry stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub account_id: u64,
    pub action: AuditAction,
    /// When the action happened (RFC3339)
    pub at: String,
    pub details: serde_json::Value,
}
