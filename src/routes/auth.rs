// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: local accounts and Google/Microsoft OAuth.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, AuthSession, SESSION_COOKIE};
use crate::models::{AuthProvider, User};
use crate::routes::cookies::{
    clear_nonce_cookie, clear_session_cookie, nonce_cookie, session_cookie, NONCE_COOKIE,
};
use crate::routes::AppJson;
use crate::services::kms::encrypt_token;
use crate::services::oauth::{generate_nonce, sign_state, verify_state};
use crate::services::password::{hash_password, verify_password};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/auth/{provider}/login", get(oauth_start))
        .route("/auth/{provider}/callback", get(oauth_callback))
        .route("/auth/logout", post(logout))
}

/// Email/password request body.
#[derive(Deserialize, Validate)]
pub struct Credentials {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TokenResponse {
    pub token: String,
}

/// Create a local account and start a session.
async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(body): AppJson<Credentials>,
) -> Result<(CookieJar, Json<TokenResponse>)> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let email = body.email.trim().to_lowercase();
    let hash = hash_password(&body.password).await?;
    state
        .users
        .create_user(&User::with_password(&email, hash))
        .await?;

    tracing::info!(email = %email, "User registered");
    start_session(&state, jar, &email)
}

/// Log in with email and password.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(body): AppJson<Credentials>,
) -> Result<(CookieJar, Json<TokenResponse>)> {
    let email = body.email.trim().to_lowercase();

    let user = state
        .users
        .get_user(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    // OAuth-only accounts have no password to check
    let hash = user
        .password_hash
        .as_deref()
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&body.password, hash).await? {
        tracing::info!(email = %email, "Rejected login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    start_session(&state, jar, &email)
}

fn start_session(
    state: &AppState,
    jar: CookieJar,
    email: &str,
) -> Result<(CookieJar, Json<TokenResponse>)> {
    let (token, _) = create_jwt(email, &state.config.jwt_signing_key)?;
    let jar = jar.add(session_cookie(&token, !state.config.is_local()));
    Ok((jar, Json(TokenResponse { token })))
}

fn parse_provider(segment: &str) -> Result<AuthProvider> {
    AuthProvider::from_path(segment)
        .ok_or_else(|| AppError::NotFound(format!("OAuth provider {}", segment)))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Start OAuth flow - redirect to the provider consent page.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let kind = parse_provider(&provider)?;
    let oauth = state.oauth_provider(kind)?;

    let nonce = generate_nonce()?;
    let oauth_state = sign_state(kind, &nonce, now_ms(), &state.config.oauth_state_key)?;

    tracing::info!(provider = %kind, "Starting OAuth flow");

    let jar = jar.add(nonce_cookie(&nonce, !state.config.is_local()));
    Ok((jar, Redirect::temporary(&oauth.authorize_url(&oauth_state))))
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

/// OAuth callback - verify state, exchange code, upsert the user, start a session.
///
/// The state is checked before anything is written.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let kind = parse_provider(&provider)?;
    let oauth = state.oauth_provider(kind)?;

    if let Some(error) = params.error {
        tracing::warn!(provider = %kind, error = %error, "OAuth error from provider");
        return Ok((
            jar.remove(clear_nonce_cookie()),
            Redirect::temporary(&format!("/login?error={}", urlencoding::encode(&error))),
        ));
    }

    let nonce = jar
        .get(NONCE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::InvalidToken)?;
    let oauth_state = params.state.ok_or(AppError::InvalidToken)?;
    verify_state(
        &oauth_state,
        kind,
        &nonce,
        now_ms(),
        &state.config.oauth_state_key,
    )?;

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let token = oauth.exchange_code(&code).await?;
    let identity = oauth.fetch_identity(&token).await?;

    // Match by provider account first. Falling back to email links a local
    // account, which is only allowed for an address the provider verified.
    let existing = match state.users.find_by_provider_id(kind, &identity.id).await? {
        Some(user) => Some(user),
        None => match state.users.get_user(&identity.email.to_lowercase()).await? {
            Some(user) if identity.email_verified => Some(user),
            Some(_) => {
                tracing::warn!(
                    provider = %kind,
                    provider_id = %identity.id,
                    "Refusing to link account by unverified email"
                );
                return Err(AppError::Conflict(
                    "An account with this email already exists".to_string(),
                ));
            }
            None => None,
        },
    };

    let (email, is_new) = match existing {
        Some(user) => {
            let blob = encrypt_token(&state.kms, &token, &user.email).await?;
            state
                .users
                .update_oauth_link(&user.email, kind, &identity.id, &blob)
                .await?;
            (user.email, false)
        }
        None => {
            let email = identity.email.to_lowercase();
            let blob = encrypt_token(&state.kms, &token, &email).await?;
            state
                .users
                .create_user(&User::with_oauth(&email, kind, &identity.id, blob))
                .await?;
            (email, true)
        }
    };

    tracing::info!(provider = %kind, email = %email, new_user = is_new, "OAuth login successful");

    let (jwt, expires_at) = create_jwt(&email, &state.config.jwt_signing_key)?;
    let session = AuthSession {
        email: email.clone(),
        token: jwt.clone(),
        expires_at,
    };
    match state.calendars.build(kind, token) {
        Ok(calendar) => {
            state.sessions.insert_calendar(&session, calendar);
        }
        Err(e) => tracing::warn!(error = %e, "Could not prime calendar adapter"),
    }

    let jar = jar
        .remove(clear_nonce_cookie())
        .add(session_cookie(&jwt, !state.config.is_local()));
    let target = if is_new { "/payment" } else { "/chat" };
    Ok((jar, Redirect::to(target)))
}

/// Log out: drop cached session state and clear the cookie.
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
    });

    if let Some(token) = token {
        state.sessions.evict(&token);
    }

    (jar.remove(clear_session_cookie()), StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_validation() {
        let ok = Credentials {
            email: "a@example.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(ok.validate().is_ok());

        let short = Credentials {
            email: "a@example.com".to_string(),
            password: "12345".to_string(),
        };
        assert!(short.validate().is_err());

        let bad_email = Credentials {
            email: "not-an-email".to_string(),
            password: "secret1".to_string(),
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn test_unknown_provider() {
        assert!(matches!(parse_provider("github"), Err(AppError::NotFound(_))));
        assert_eq!(parse_provider("microsoft").unwrap(), AuthProvider::Microsoft);
    }
}
