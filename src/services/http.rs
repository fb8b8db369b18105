// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared outbound HTTP helpers for vendor REST APIs.

use crate::error::AppError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Request timeout applied to every vendor call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Whose credential authorizes a request.
///
/// A 401 on a call made with the user's OAuth token means the stored
/// credential is unusable; a 401 with our own API key is a vendor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    User,
    Service,
}

/// Build the shared reqwest client.
pub fn build_client() -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))
}

/// Map a transport failure to `Upstream`.
pub fn send_error(vendor: &str, err: reqwest::Error) -> AppError {
    AppError::Upstream(format!("{} request failed: {}", vendor, err))
}

/// Check response status and return error if not successful.
pub async fn check_response(
    vendor: &str,
    credential: Credential,
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 401 && credential == Credential::User {
        return Err(AppError::ProviderCredential(format!(
            "{} rejected the access token",
            vendor
        )));
    }

    tracing::warn!(vendor, status = %status, body = %body, "Vendor API call failed");
    Err(AppError::Upstream(format!("{} HTTP {}: {}", vendor, status, body)))
}

/// Check response and parse JSON body.
pub async fn check_response_json<T: DeserializeOwned>(
    vendor: &str,
    credential: Credential,
    response: reqwest::Response,
) -> Result<T, AppError> {
    check_response(vendor, credential, response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("{} JSON parse error: {}", vendor, e)))
}
