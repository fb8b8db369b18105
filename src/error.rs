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
///
/// Every service and handler returns this type; `IntoResponse` below is the
/// only place where errors become transport responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    /// The OAuth credential stored for the user is malformed, expired, or
    /// was rejected by the provider.
    #[error("Provider credential unusable: {0}")]
    ProviderCredential(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("An active subscription plan is required")]
    SubscriptionRequired,

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Upstream API timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors caused by the user's stored provider credential.
    pub fn is_provider_credential_error(&self) -> bool {
        matches!(self, AppError::ProviderCredential(_))
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
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AppError::InvalidSignature => {
                tracing::warn!("Rejected request with invalid webhook signature");
                (StatusCode::UNAUTHORIZED, "invalid_signature", None)
            }
            AppError::ProviderCredential(msg) => {
                tracing::warn!(reason = %msg, "Stored provider credential unusable");
                (
                    StatusCode::UNAUTHORIZED,
                    "provider_credential",
                    Some(msg.clone()),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::SubscriptionRequired => (
                StatusCode::PAYMENT_REQUIRED,
                "subscription_required",
                None,
            ),
            AppError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Upstream API error");
                (StatusCode::BAD_GATEWAY, "upstream_error", Some(msg.clone()))
            }
            AppError::UpstreamTimeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
                Some(msg.clone()),
            ),
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
