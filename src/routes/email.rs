// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mail route (Gmail accounts only).

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthSession;
use crate::models::{AuthProvider, Email};
use crate::services::gmail::GmailClient;
use crate::services::kms::decrypt_token;
use crate::services::oauth::TokenSource;
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

const MAIL_WINDOW_DAYS: i64 = 7;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/email", get(list_email))
}

#[derive(Serialize)]
pub struct EmailResponse {
    /// `null` where a message could not be fetched
    pub items: Vec<Option<Email>>,
}

async fn list_email(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<EmailResponse>> {
    let user = state
        .users
        .get_user(&session.email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", session.email)))?;

    if user.provider != Some(AuthProvider::Google) {
        return Err(AppError::BadRequest(
            "Email is only available for Google accounts".to_string(),
        ));
    }
    let blob = user.oauth_token_encrypted.as_deref().ok_or_else(|| {
        AppError::ProviderCredential("no stored provider credential".to_string())
    })?;
    let token = decrypt_token(&state.kms, blob, &user.email).await?;

    let gmail = GmailClient::new(
        state.http.clone(),
        TokenSource::new(state.google_oauth.clone(), token),
    );

    let end = Utc::now();
    let items = gmail
        .list_emails(end - Duration::days(MAIL_WINDOW_DAYS), end)
        .await?;

    Ok(Json(EmailResponse { items }))
}
