// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat route.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthSession;
use crate::routes::AppJson;
use crate::AppState;
use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/ai-chat", post(ai_chat))
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChatResponse {
    /// Model output, normally a JSON document
    pub reply: String,
}

async fn ai_chat(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    AppJson(body): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    if body.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message is empty".to_string()));
    }

    let reply = state.sessions.send_chat(&session, &body.message).await?;
    tracing::debug!(email = %session.email, reply_len = reply.len(), "Chat reply");

    Ok(Json(ChatResponse { reply }))
}
