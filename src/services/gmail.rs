// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gmail reader (`users.messages` list + get).

use crate::error::AppError;
use crate::models::Email;
use crate::services::http::{check_response_json, send_error, Credential};
use crate::services::oauth::TokenSource;
use crate::time_utils::format_utc_rfc3339;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::join_all;
use pulldown_cmark::{html, Options, Parser};
use serde::Deserialize;

const VENDOR: &str = "Gmail";

pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    #[serde(default)]
    pub internal_date: Option<String>,
    pub payload: MessagePart,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl GmailClient {
    pub fn new(http: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            http,
            base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Messages received in `[start, end)`, fetched concurrently.
    ///
    /// Slots whose fetch failed are `None`; the list call itself failing is an error.
    pub async fn list_emails(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Option<Email>>, AppError> {
        let access_token = self.tokens.access_token().await?;
        let query = format!("after:{} before:{}", start.timestamp(), end.timestamp());

        let response = self
            .http
            .get(format!("{}/users/me/messages", self.base_url))
            .bearer_auth(&access_token)
            .query(&[("q", query.as_str())])
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;
        let list: MessageList = check_response_json(VENDOR, Credential::User, response).await?;

        tracing::debug!(count = list.messages.len(), "Gmail messages listed");

        let fetches = list
            .messages
            .iter()
            .map(|m| self.fetch_email(&access_token, &m.id));

        Ok(join_all(fetches).await)
    }

    async fn fetch_email(&self, access_token: &str, id: &str) -> Option<Email> {
        let result = async {
            let response = self
                .http
                .get(format!(
                    "{}/users/me/messages/{}",
                    self.base_url,
                    urlencoding::encode(id)
                ))
                .bearer_auth(access_token)
                .query(&[("format", "full")])
                .send()
                .await
                .map_err(|e| send_error(VENDOR, e))?;
            check_response_json::<GmailMessage>(VENDOR, Credential::User, response).await
        }
        .await;

        match result {
            Ok(message) => Some(to_email(&message)),
            Err(e) => {
                tracing::warn!(message_id = %id, error = %e, "Failed to fetch Gmail message");
                None
            }
        }
    }
}

/// Render a fetched message. HTML bodies pass through; plain text is
/// rendered as markdown with hard line breaks.
pub fn to_email(message: &GmailMessage) -> Email {
    let header = |name: &str| {
        message
            .payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .unwrap_or_default()
    };

    let body = match extract_body(&message.payload, "text/html") {
        Some(html) => html,
        None => extract_body(&message.payload, "text/plain")
            .map(|text| markdown_to_html(&text))
            .unwrap_or_default(),
    };

    let send_at = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(format_utc_rfc3339)
        .unwrap_or_default();

    Email {
        kind: "html".to_string(),
        subject: format!("{} From: {}", header("Subject"), header("From")),
        body,
        send_at,
    }
}

/// First non-empty leaf part of the given MIME type, depth first.
pub fn extract_body(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.parts.is_empty() {
        if part.mime_type != mime_type {
            return None;
        }
        let data = part.body.as_ref()?.data.as_deref()?;
        let bytes = URL_SAFE
            .decode(data)
            .or_else(|_| URL_SAFE_NO_PAD.decode(data))
            .ok()?;
        return String::from_utf8(bytes).ok().filter(|s| !s.is_empty());
    }

    part.parts.iter().find_map(|p| extract_body(p, mime_type))
}

pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let events = Parser::new_ext(text, options).map(|event| match event {
        pulldown_cmark::Event::SoftBreak => pulldown_cmark::Event::HardBreak,
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, events);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: mime.to_string(),
            headers: Vec::new(),
            body: Some(PartBody {
                data: Some(URL_SAFE.encode(text)),
            }),
            parts: Vec::new(),
        }
    }

    #[test]
    fn test_prefers_html_part() {
        let message = GmailMessage {
            internal_date: Some("1704186000000".to_string()),
            payload: MessagePart {
                mime_type: "multipart/alternative".to_string(),
                headers: vec![
                    Header {
                        name: "Subject".to_string(),
                        value: "Lunch".to_string(),
                    },
                    Header {
                        name: "From".to_string(),
                        value: "bob@example.com".to_string(),
                    },
                ],
                body: None,
                parts: vec![leaf("text/plain", "plain"), leaf("text/html", "<p>rich</p>")],
            },
        };

        let email = to_email(&message);
        assert_eq!(email.kind, "html");
        assert_eq!(email.subject, "Lunch From: bob@example.com");
        assert_eq!(email.body, "<p>rich</p>");
        assert_eq!(email.send_at, "2024-01-02T09:00:00Z");
    }

    #[test]
    fn test_plain_text_rendered_with_hard_breaks() {
        let message = GmailMessage {
            internal_date: None,
            payload: leaf("text/plain", "line one\nline **two**"),
        };
        let email = to_email(&message);
        assert!(email.body.contains("line one<br />"));
        assert!(email.body.contains("<strong>two</strong>"));
    }

    #[test]
    fn test_unpadded_base64() {
        let part = MessagePart {
            mime_type: "text/html".to_string(),
            headers: Vec::new(),
            body: Some(PartBody {
                data: Some(URL_SAFE_NO_PAD.encode("<b>x</b>")),
            }),
            parts: Vec::new(),
        };
        assert_eq!(extract_body(&part, "text/html").as_deref(), Some("<b>x</b>"));
    }
}
