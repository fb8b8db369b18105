// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar proxy routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthSession;
use crate::models::CalendarEvent;
use crate::routes::{AppJson, MessageResponse};
use crate::services::calendar::parse_rfc3339;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Default listing window when no range is given.
const DEFAULT_WINDOW_DAYS: i64 = 7;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/calendar-create", post(create_event))
        .route("/api/calendar-remove", post(remove_event))
        .route("/api/calendar-load", get(load_events))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    AppJson(event): AppJson<CalendarEvent>,
) -> Result<Json<MessageResponse>> {
    if event.title.trim().is_empty() {
        return Err(AppError::BadRequest("Event title is required".to_string()));
    }

    let calendar = state.sessions.calendar_for(&session).await?;
    calendar.create_event(&event).await?;

    tracing::info!(email = %session.email, title = %event.title, "Calendar event created");
    state
        .sessions
        .note_calendar_change(&session.token, "Create", &event)
        .await;

    Ok(MessageResponse::new("Event created"))
}

async fn remove_event(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    AppJson(event): AppJson<CalendarEvent>,
) -> Result<Json<MessageResponse>> {
    let calendar = state.sessions.calendar_for(&session).await?;
    calendar.remove_event(&event).await?;

    tracing::info!(email = %session.email, event_id = %event.id, "Calendar event removed");
    state
        .sessions
        .note_calendar_change(&session.token, "Remove", &event)
        .await;

    Ok(MessageResponse::new("Event removed"))
}

#[derive(Deserialize)]
pub struct RangeParams {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EventsResponse {
    pub items: Vec<CalendarEvent>,
}

/// List events in `[start, end]`, defaulting to the next seven days.
async fn load_events(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Query(params): Query<RangeParams>,
) -> Result<Json<EventsResponse>> {
    let start = match params.start.as_deref() {
        Some(s) => parse_rfc3339(s, "start")?,
        None => Utc::now(),
    };
    let end = match params.end.as_deref() {
        Some(s) => parse_rfc3339(s, "end")?,
        None => start + Duration::days(DEFAULT_WINDOW_DAYS),
    };
    if end < start {
        return Err(AppError::BadRequest("end must not precede start".to_string()));
    }

    let calendar = state.sessions.calendar_for(&session).await?;
    let items = calendar.list_events(start, end).await?;

    Ok(Json(EventsResponse { items }))
}
