// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Microsoft Graph calendar adapter.
//!
//! Graph's `/me/calendar/events` is not range-filtered, so the window is
//! applied here after parsing each event's start and end as UTC.

use crate::error::AppError;
use crate::models::CalendarEvent;
use crate::services::calendar::{parse_rfc3339, Calendar};
use crate::services::http::{check_response, check_response_json, send_error, Credential};
use crate::services::oauth::TokenSource;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const VENDOR: &str = "Microsoft Graph";

/// Graph datetime layout, e.g. `2024-01-02T09:00:00.0000000`.
const GRAPH_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Upper bound on `@odata.nextLink` pages followed per listing. A listing
/// that still has a next page after this many is an error, not a short result.
pub const MAX_PAGES: usize = 10;

/// Events requested per Graph page (`$top`).
const PAGE_SIZE: usize = 100;

pub struct MicrosoftCalendar {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
}

impl MicrosoftCalendar {
    pub fn new(http: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            http,
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/me/calendar/events", self.base_url)
    }
}

#[async_trait]
impl Calendar for MicrosoftCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> Result<(), AppError> {
        let start = parse_rfc3339(&event.start_time, "startTime")?;
        let end = parse_rfc3339(&event.end_time, "endTime")?;
        let access_token = self.tokens.access_token().await?;

        let body = GraphEventInsert {
            subject: &event.title,
            start: GraphDateTime::utc(start),
            end: GraphDateTime::utc(end),
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
        tracing::debug!(title = %event.title, "Graph event created");
        Ok(())
    }

    async fn remove_event(&self, event: &CalendarEvent) -> Result<(), AppError> {
        if event.id.is_empty() {
            return Err(AppError::BadRequest("Event id is required".to_string()));
        }
        let access_token = self.tokens.access_token().await?;

        let url = format!("{}/{}", self.events_url(), urlencoding::encode(&event.id));
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

        let mut raw = Vec::new();
        let mut url = format!(
            "{}?$top={}&$orderby=start/dateTime",
            self.events_url(),
            PAGE_SIZE
        );
        let mut pages = 0;

        loop {
            if pages == MAX_PAGES {
                tracing::warn!(pages, fetched = raw.len(), "Graph listing exceeds page limit");
                return Err(AppError::Upstream(format!(
                    "{} returned more than {} pages of events",
                    VENDOR, MAX_PAGES
                )));
            }
            pages += 1;

            let response = self
                .http
                .get(&url)
                .bearer_auth(&access_token)
                .header("Prefer", "outlook.timezone=\"UTC\"")
                .send()
                .await
                .map_err(|e| send_error(VENDOR, e))?;

            let page: GraphEventList =
                check_response_json(VENDOR, Credential::User, response).await?;
            raw.extend(page.value);

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(filter_to_window(raw, start, end))
    }
}

/// Keep events that lie entirely within `[start, end]`.
///
/// Events whose times cannot be parsed are skipped.
pub fn filter_to_window(
    events: Vec<GraphEvent>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter_map(|event| {
            let (Some(event_start), Some(event_end)) = (
                parse_graph_datetime(&event.start.date_time),
                parse_graph_datetime(&event.end.date_time),
            ) else {
                tracing::warn!(id = %event.id, "Skipping Graph event with unparseable times");
                return None;
            };

            if event_start < start || event_end > end {
                return None;
            }

            Some(CalendarEvent {
                title: event.subject.unwrap_or_default(),
                start_time: event.start.date_time,
                end_time: event.end.date_time,
                id: event.id,
            })
        })
        .collect()
}

fn parse_graph_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, GRAPH_DATETIME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

#[derive(Serialize)]
struct GraphEventInsert<'a> {
    subject: &'a str,
    start: GraphDateTime,
    end: GraphDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDateTime {
    pub date_time: String,
    #[serde(default)]
    pub time_zone: String,
}

impl GraphDateTime {
    fn utc(t: DateTime<Utc>) -> Self {
        Self {
            date_time: t.format("%Y-%m-%dT%H:%M:%S").to_string(),
            time_zone: "UTC".to_string(),
        }
    }
}

/// Event as returned by Graph (fields this adapter reads).
#[derive(Debug, Clone, Deserialize)]
pub struct GraphEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub start: GraphDateTime,
    pub end: GraphDateTime,
}

#[derive(Deserialize)]
struct GraphEventList {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}
