// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar-aware chat sessions.
//!
//! A session is bound to one model and a system prompt computed when it is
//! created. History only grows, and only after a successful round trip.

use crate::error::AppError;
use crate::models::{CalendarEvent, Tier};
use crate::services::gemini::{GenerateRequest, LlmClient};
use crate::time_utils::{format_day, format_human, format_utc_rfc3339};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

pub const PREMIUM_MODEL: &str = "gemini-1.5-pro";
pub const BASIC_MODEL: &str = "gemini-1.5-flash";

const TEMPERATURE: f32 = 0.7;
const RESPONSE_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub parts: Vec<String>,
}

pub fn model_for_tier(tier: Tier) -> &'static str {
    match tier {
        Tier::Premium => PREMIUM_MODEL,
        Tier::Basic => BASIC_MODEL,
    }
}

/// One event per entry: `"<title> start: <start>end: <end>,"`.
pub fn format_events(events: &[CalendarEvent]) -> String {
    events
        .iter()
        .map(|e| format!("{} start: {}end: {},", e.title, e.start_time, e.end_time))
        .collect()
}

pub fn build_system_prompt(events: &[CalendarEvent], today: DateTime<Utc>) -> String {
    format!(
        r#"You are a professional calendar management assistant with direct access to modify the calendar. Always answer with a single valid JSON object.

Current date: {date}
Current calendar events: {events}

Response format:
{{
  "understood": boolean,
  "action": string,          // "add_event", "remove_event", "reschedule" or "info"
  "details": {{
    "title": string,
    "startTime": string,
    "endTime": string,
    "originalStart": string, // reschedule only
    "originalEnd": string,   // reschedule only
    "newStart": string,      // reschedule only
    "newEnd": string         // reschedule only
  }},
  "message": string,         // explanation for the user
  "suggestions": [string],
  "conflicts": [string]
}}

Rules:
- Adding an event: action "add_event" with title, startTime and endTime.
- Removing an event: action "remove_event" with title, startTime and endTime.
- Rescheduling: action "reschedule" with every time field set.
- Use ISO 8601 for all times and account for time zones.
- Check for scheduling conflicts and report them in "conflicts".
- Put optimization ideas in "suggestions".
- Never answer outside the JSON object."#,
        date = format_day(today),
        events = format_events(events),
    )
}

pub struct ChatSession {
    model: String,
    system_prompt: String,
    history: Vec<ChatMessage>,
    timeout: Duration,
}

impl ChatSession {
    /// Start a session seeded with the user's upcoming events.
    pub fn start(
        tier: Tier,
        events: &[CalendarEvent],
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Self {
        Self {
            model: model_for_tier(tier).to_string(),
            system_prompt: build_system_prompt(events, now),
            history: Vec::new(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send a user message and return the concatenated reply.
    ///
    /// On timeout or vendor error the history is left unchanged.
    pub async fn send(
        &mut self,
        llm: &dyn LlmClient,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let user_message = ChatMessage {
            role: ChatRole::User,
            parts: vec![format!("{} : {}", format_utc_rfc3339(now), message)],
        };

        let mut contents = self.history.clone();
        contents.push(user_message.clone());

        let request = GenerateRequest {
            model: self.model.clone(),
            system_instruction: self.system_prompt.clone(),
            contents,
            temperature: TEMPERATURE,
            response_mime_type: RESPONSE_MIME_TYPE.to_string(),
        };

        let parts = match tokio::time::timeout(self.timeout, llm.generate(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(model = %self.model, "LLM call timed out");
                return Err(AppError::UpstreamTimeout(format!(
                    "no reply within {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let reply = parts.concat();
        self.history.push(user_message);
        self.history.push(ChatMessage {
            role: ChatRole::Model,
            parts,
        });
        Ok(reply)
    }

    /// Tell the model about a calendar change made outside the chat.
    pub fn note_calendar_change(&mut self, action: &str, event: &CalendarEvent) {
        let note = format!(
            "Calendar Update:\n\tAction: {}\n\tEvent: {}\n\tTime: {} to {}",
            action,
            event.title,
            format_human(&event.start_time),
            format_human(&event.end_time),
        );
        self.history.push(ChatMessage {
            role: ChatRole::User,
            parts: vec![note],
        });
    }
}
