// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider-neutral calendar contract and its vendor adapters.

pub mod google;
pub mod microsoft;

pub use google::GoogleCalendar;
pub use microsoft::MicrosoftCalendar;

use crate::error::AppError;
use crate::models::{AuthProvider, CalendarEvent, OAuthToken};
use crate::services::oauth::{OAuthProvider, TokenSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Uniform calendar operations over a user's primary calendar.
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn create_event(&self, event: &CalendarEvent) -> Result<(), AppError>;

    async fn remove_event(&self, event: &CalendarEvent) -> Result<(), AppError>;

    /// Events within `[start, end]`.
    async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, AppError>;
}

/// Builds the calendar adapter matching a user's provider.
pub trait CalendarFactory: Send + Sync {
    fn build(
        &self,
        provider: AuthProvider,
        token: OAuthToken,
    ) -> Result<Arc<dyn Calendar>, AppError>;
}

/// Production factory for Google Calendar and Microsoft Graph adapters.
pub struct ProviderCalendarFactory {
    http: reqwest::Client,
    google: Arc<OAuthProvider>,
    microsoft: Option<Arc<OAuthProvider>>,
}

impl ProviderCalendarFactory {
    pub fn new(
        http: reqwest::Client,
        google: Arc<OAuthProvider>,
        microsoft: Option<Arc<OAuthProvider>>,
    ) -> Self {
        Self {
            http,
            google,
            microsoft,
        }
    }
}

impl CalendarFactory for ProviderCalendarFactory {
    fn build(
        &self,
        provider: AuthProvider,
        token: OAuthToken,
    ) -> Result<Arc<dyn Calendar>, AppError> {
        match provider {
            AuthProvider::Google => {
                let tokens = TokenSource::new(self.google.clone(), token);
                Ok(Arc::new(GoogleCalendar::new(self.http.clone(), tokens)))
            }
            AuthProvider::Microsoft => {
                let oauth = self.microsoft.clone().ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("Microsoft sign-in is not configured"))
                })?;
                let tokens = TokenSource::new(oauth, token);
                Ok(Arc::new(MicrosoftCalendar::new(self.http.clone(), tokens)))
            }
        }
    }
}

/// Parse an RFC 3339 timestamp from a request into UTC.
pub fn parse_rfc3339(value: &str, field: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AppError::BadRequest(format!("{} must be an RFC 3339 timestamp", field)))
}
