// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Calendar v3 adapter (primary calendar).

use crate::error::AppError;
use crate::models::CalendarEvent;
use crate::services::calendar::Calendar;
use crate::services::http::{check_response, check_response_json, send_error, Credential};
use crate::services::oauth::TokenSource;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const VENDOR: &str = "Google Calendar";

pub struct GoogleCalendar {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
}

impl GoogleCalendar {
    pub fn new(http: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            http,
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/primary/events", self.base_url)
    }
}

#[async_trait]
impl Calendar for GoogleCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> Result<(), AppError> {
        let access_token = self.tokens.access_token().await?;

        let body = GoogleEventInsert {
            id: Some(event.id.as_str()).filter(|id| !id.is_empty()),
            summary: &event.title,
            start: EventDateTimeInsert {
                date_time: &event.start_time,
            },
            end: EventDateTimeInsert {
                date_time: &event.end_time,
            },
        };

        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(&access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;

        check_response(VENDOR, Credential::User, response).await?;
        tracing::debug!(title = %event.title, "Google event created");
        Ok(())
    }

    async fn remove_event(&self, event: &CalendarEvent) -> Result<(), AppError> {
        if event.id.is_empty() {
            return Err(AppError::BadRequest("Event id is required".to_string()));
        }
        let access_token = self.tokens.access_token().await?;

        let url = format!(
            "{}/{}",
            self.events_url(),
            urlencoding::encode(&event.id)
        );
        let response = self
            .http
            .delete(url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;

        check_response(VENDOR, Credential::User, response).await?;
        Ok(())
    }

    async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, AppError> {
        let access_token = self.tokens.access_token().await?;
        let time_min = format_utc_rfc3339(start);
        let time_max = format_utc_rfc3339(end);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(self.events_url())
                .bearer_auth(&access_token)
                .query(&query)
                .send()
                .await
                .map_err(|e| send_error(VENDOR, e))?;

            let page: GoogleEventList =
                check_response_json(VENDOR, Credential::User, response).await?;

            events.extend(page.items.into_iter().map(GoogleEvent::into_event));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(events)
    }
}

#[derive(Serialize)]
struct GoogleEventInsert<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    summary: &'a str,
    start: EventDateTimeInsert<'a>,
    end: EventDateTimeInsert<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTimeInsert<'a> {
    date_time: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct GoogleEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: EventDateTime,
    #[serde(default)]
    end: EventDateTime,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    #[serde(default)]
    date_time: Option<String>,
    /// All-day events carry only a date
    #[serde(default)]
    date: Option<String>,
}

impl EventDateTime {
    fn into_string(self) -> String {
        self.date_time.or(self.date).unwrap_or_default()
    }
}

impl GoogleEvent {
    fn into_event(self) -> CalendarEvent {
        CalendarEvent {
            title: self.summary.unwrap_or_default(),
            start_time: self.start.into_string(),
            end_time: self.end.into_string(),
            id: self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_day_event_translation() {
        let event: GoogleEvent = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "summary": "Holiday",
            "start": {"date": "2024-01-02"},
            "end": {"date": "2024-01-03"},
            "location": "ignored"
        }))
        .unwrap();
        let event = event.into_event();
        assert_eq!(event.title, "Holiday");
        assert_eq!(event.start_time, "2024-01-02");
        assert_eq!(event.end_time, "2024-01-03");
    }

    #[test]
    fn test_insert_body_omits_empty_id() {
        let body = GoogleEventInsert {
            id: Some("").filter(|id| !id.is_empty()),
            summary: "Standup",
            start: EventDateTimeInsert {
                date_time: "2024-01-02T09:00:00Z",
            },
            end: EventDateTimeInsert {
                date_time: "2024-01-02T09:15:00Z",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["start"]["dateTime"], "2024-01-02T09:00:00Z");
    }
}
