// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session JWT issuing and authentication middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "token";

/// Session lifetime.
pub const SESSION_TTL_DAYS: i64 = 7;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Authenticated session extracted from the JWT.
///
/// `token` is the raw credential string; it keys the session cache.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Middleware that requires a valid session credential.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(AppError::Unauthorized)?,
    };

    let session = validate_jwt(&token, &state.config.jwt_signing_key)?;
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Validate a session JWT and return the session it describes.
pub fn validate_jwt(token: &str, signing_key: &[u8]) -> Result<AuthSession, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let data = decode::<Claims>(token, &key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "Session token rejected");
        AppError::InvalidToken
    })?;

    let expires_at = DateTime::from_timestamp(data.claims.exp, 0).ok_or(AppError::InvalidToken)?;

    Ok(AuthSession {
        email: data.claims.sub,
        token: token.to_string(),
        expires_at,
    })
}

/// Create a JWT for a user session. Returns the token and its expiry.
pub fn create_jwt(email: &str, signing_key: &[u8]) -> Result<(String, DateTime<Utc>), AppError> {
    let now = Utc::now();
    let expires_at = now + Duration::days(SESSION_TTL_DAYS);

    let claims = Claims {
        sub: email.to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    Ok((token, expires_at))
}
