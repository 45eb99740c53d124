// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    /// No usable provider credential. Terminal until the user re-authorizes.
    #[error("Google Fit authorization required")]
    NotAuthorized,

    /// Network failure, timeout, 429 or 5xx from the provider.
    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    /// Provider rejected the request (4xx other than 429).
    #[error("Provider API error: {0}")]
    ProviderApi(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Duplicate key on insert. Callers treat this as "already stored".
    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the next scheduled run is expected to succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::TransientProvider(_) | AppError::MalformedResponse(_) | AppError::Database(_)
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotAuthorized => (
                StatusCode::FORBIDDEN,
                "reconnect_required",
                Some("Last sync failed. Reconnect Google Fit.".to_string()),
            ),
            AppError::TransientProvider(msg)
            | AppError::ProviderApi(msg)
            | AppError::MalformedResponse(msg) => {
                tracing::warn!(error = %msg, "Provider error surfaced as sync_incomplete");
                (StatusCode::BAD_GATEWAY, "sync_incomplete", None)
            }
            AppError::StorageConflict(msg) => {
                (StatusCode::CONFLICT, "conflict", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
