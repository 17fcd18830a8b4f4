// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Background polling cycles catch these at the cycle boundary and log them;
//! request handlers surface them through [`IntoResponse`].

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

    /// No credential is stored for the user.
    #[error("No credential stored for {0}")]
    CredentialNotFound(String),

    /// The authorization server rejected the refresh grant. The credential
    /// has already been purged when this is returned.
    #[error("Refresh grant rejected: {0}")]
    RefreshRejected(String),

    /// Refresh did not succeed but the grant itself was not rejected.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The provider refused the bearer token.
    #[error("Provider rejected credential: {0}")]
    Auth(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("No data available: {0}")]
    DataUnavailable(String),

    #[error("Provider API error: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A stored record failed authenticated decryption.
    #[error("Stored credential is corrupt: {0}")]
    Corruption(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Missing, rejected, or unusable credential.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            AppError::Unauthorized
                | AppError::CredentialNotFound(_)
                | AppError::RefreshRejected(_)
                | AppError::Auth(_)
                | AppError::Corruption(_)
        )
    }

    /// Failures a later attempt may not hit (timeouts, 5xx, refresh hiccups).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::TransientNetwork(_) | AppError::RefreshFailed(_)
        )
    }

    /// The credential should be treated as absent.
    pub fn is_credential_absent(&self) -> bool {
        matches!(
            self,
            AppError::CredentialNotFound(_) | AppError::RefreshRejected(_) | AppError::Corruption(_)
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
            AppError::CredentialNotFound(_) | AppError::Auth(_) => {
                (StatusCode::UNAUTHORIZED, "not_authenticated", None)
            }
            AppError::RefreshRejected(_) => (
                StatusCode::UNAUTHORIZED,
                "not_authenticated",
                Some("authorization revoked, reconnect required".to_string()),
            ),
            AppError::Corruption(msg) => {
                tracing::error!(error = %msg, "Corrupt credential record");
                (StatusCode::UNAUTHORIZED, "not_authenticated", None)
            }
            AppError::RefreshFailed(msg) | AppError::TransientNetwork(msg) => {
                tracing::warn!(error = %msg, "Upstream unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable", None)
            }
            AppError::DataUnavailable(msg) => (StatusCode::NOT_FOUND, "no_data", Some(msg.clone())),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", Some(msg.clone())),
            AppError::Persistence(msg) => {
                tracing::error!(error = %msg, "Persistence error");
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
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
