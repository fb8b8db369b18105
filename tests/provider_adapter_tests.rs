// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Vendor adapter tests against a mock Google/Graph/Gmail server.

use calendar_assistant::config::Config;
use calendar_assistant::error::AppError;
use calendar_assistant::models::{CalendarEvent, OAuthToken};
use calendar_assistant::services::calendar::microsoft::MAX_PAGES;
use calendar_assistant::services::calendar::{GoogleCalendar, MicrosoftCalendar};
use calendar_assistant::services::oauth::OAuthEndpoints;
use calendar_assistant::services::{Calendar, GmailClient, OAuthProvider, TokenSource};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::test_token;

fn google_tokens(server: &MockServer, token: OAuthToken) -> TokenSource {
    let provider = OAuthProvider::google(&Config::test_default(), reqwest::Client::new())
        .with_endpoints(OAuthEndpoints {
            auth_url: format!("{}/auth", server.uri()),
            token_url: format!("{}/token", server.uri()),
            userinfo_url: format!("{}/userinfo", server.uri()),
        });
    TokenSource::new(Arc::new(provider), token)
}

fn microsoft_tokens(server: &MockServer) -> TokenSource {
    let provider = OAuthProvider::microsoft(&Config::test_default(), reqwest::Client::new())
        .unwrap()
        .with_endpoints(OAuthEndpoints {
            auth_url: format!("{}/authorize", server.uri()),
            token_url: format!("{}/token", server.uri()),
            userinfo_url: format!("{}/me", server.uri()),
        });
    TokenSource::new(Arc::new(provider), test_token())
}

fn window() -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
    )
}

// ─── Google Calendar ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_google_list_sends_window_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("timeMin", "2024-01-02T00:00:00Z"))
        .and(query_param("timeMax", "2024-01-03T00:00:00Z"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .and(header("authorization", "Bearer ya29.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "g1",
                    "summary": "Standup",
                    "start": { "dateTime": "2024-01-02T09:00:00Z" },
                    "end": { "dateTime": "2024-01-02T09:15:00Z" }
                },
                {
                    "id": "g2",
                    "summary": "Holiday",
                    "start": { "date": "2024-01-02" },
                    "end": { "date": "2024-01-03" }
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let calendar = GoogleCalendar::new(reqwest::Client::new(), google_tokens(&server, test_token()))
        .with_base_url(server.uri());
    let (start, end) = window();
    let events = calendar.list_events(start, end).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].title, "Standup");
    assert_eq!(events[0].start_time, "2024-01-02T09:00:00Z");
    assert_eq!(events[1].start_time, "2024-01-02");
}

#[tokio::test]
async fn test_google_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "b", "summary": "Second",
                        "start": { "dateTime": "2024-01-02T11:00:00Z" },
                        "end": { "dateTime": "2024-01-02T12:00:00Z" } }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "a", "summary": "First",
                        "start": { "dateTime": "2024-01-02T09:00:00Z" },
                        "end": { "dateTime": "2024-01-02T10:00:00Z" } }],
            "nextPageToken": "page-2"
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let calendar = GoogleCalendar::new(reqwest::Client::new(), google_tokens(&server, test_token()))
        .with_base_url(server.uri());
    let (start, end) = window();
    let titles: Vec<String> = calendar
        .list_events(start, end)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.title)
        .collect();

    assert_eq!(titles, vec!["First".to_string(), "Second".to_string()]);
}

#[tokio::test]
async fn test_google_rejected_token_is_credential_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let calendar = GoogleCalendar::new(reqwest::Client::new(), google_tokens(&server, test_token()))
        .with_base_url(server.uri());
    let err = calendar
        .create_event(&CalendarEvent {
            title: "Standup".to_string(),
            start_time: "2024-01-02T09:00:00Z".to_string(),
            end_time: "2024-01-02T09:15:00Z".to_string(),
            id: String::new(),
        })
        .await
        .unwrap_err();

    assert!(err.is_provider_credential_error());
}

#[tokio::test]
async fn test_expired_token_refreshed_before_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.renewed",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(header("authorization", "Bearer ya29.renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut expired = test_token();
    expired.expiry = Some(Utc::now() - Duration::minutes(5));
    let calendar = GoogleCalendar::new(reqwest::Client::new(), google_tokens(&server, expired))
        .with_base_url(server.uri());

    let (start, end) = window();
    assert!(calendar.list_events(start, end).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_refused_is_credential_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let mut expired = test_token();
    expired.expiry = Some(Utc::now() - Duration::minutes(5));
    let calendar = GoogleCalendar::new(reqwest::Client::new(), google_tokens(&server, expired))
        .with_base_url(server.uri());

    let (start, end) = window();
    let err = calendar.list_events(start, end).await.unwrap_err();
    assert!(matches!(err, AppError::ProviderCredential(_)));
}

#[tokio::test]
async fn test_identity_email_verification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "g-1",
            "email": "ada@example.com",
            "verified_email": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m-1",
            "mail": "ada@example.com",
            "userPrincipalName": "ada@example.com",
            "email_verified": true
        })))
        .mount(&server)
        .await;

    let google = OAuthProvider::google(&Config::test_default(), reqwest::Client::new())
        .with_endpoints(OAuthEndpoints {
            auth_url: format!("{}/auth", server.uri()),
            token_url: format!("{}/token", server.uri()),
            userinfo_url: format!("{}/userinfo", server.uri()),
        });
    let identity = google.fetch_identity(&test_token()).await.unwrap();
    assert!(identity.email_verified);

    let microsoft = OAuthProvider::microsoft(&Config::test_default(), reqwest::Client::new())
        .unwrap()
        .with_endpoints(OAuthEndpoints {
            auth_url: format!("{}/authorize", server.uri()),
            token_url: format!("{}/token", server.uri()),
            userinfo_url: format!("{}/me", server.uri()),
        });
    let identity = microsoft.fetch_identity(&test_token()).await.unwrap();
    assert_eq!(identity.email, "ada@example.com");
    assert!(!identity.email_verified);
}

// ─── Microsoft Graph ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_graph_list_filters_to_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/calendar/events"))
        .and(query_param("$top", "100"))
        .and(query_param("$orderby", "start/dateTime"))
        .and(header("prefer", "outlook.timezone=\"UTC\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "id": "m1",
                    "subject": "Standup",
                    "start": { "dateTime": "2024-01-02T09:00:00.0000000", "timeZone": "UTC" },
                    "end": { "dateTime": "2024-01-02T09:15:00.0000000", "timeZone": "UTC" }
                },
                {
                    "id": "m2",
                    "subject": "Retro",
                    "start": { "dateTime": "2024-01-05T09:00:00.0000000", "timeZone": "UTC" },
                    "end": { "dateTime": "2024-01-05T10:00:00.0000000", "timeZone": "UTC" }
                }
            ]
        })))
        .mount(&server)
        .await;

    let calendar = MicrosoftCalendar::new(reqwest::Client::new(), microsoft_tokens(&server))
        .with_base_url(server.uri());
    let (start, end) = window();
    let events = calendar.list_events(start, end).await.unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "m1");
    assert_eq!(events[0].title, "Standup");
}

#[tokio::test]
async fn test_graph_list_errors_past_page_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/calendar/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@odata.nextLink": format!("{}/me/calendar/events?$skip=100", server.uri())
        })))
        .expect(MAX_PAGES as u64)
        .mount(&server)
        .await;

    let calendar = MicrosoftCalendar::new(reqwest::Client::new(), microsoft_tokens(&server))
        .with_base_url(server.uri());
    let (start, end) = window();
    let err = calendar.list_events(start, end).await.unwrap_err();

    assert!(matches!(err, AppError::Upstream(_)));
}

#[tokio::test]
async fn test_graph_create_sends_utc_times() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/me/calendar/events"))
        .and(body_partial_json(json!({
            "subject": "Standup",
            "start": { "dateTime": "2024-01-02T09:00:00", "timeZone": "UTC" },
            "end": { "dateTime": "2024-01-02T09:15:00", "timeZone": "UTC" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "m9" })))
        .expect(1)
        .mount(&server)
        .await;

    let calendar = MicrosoftCalendar::new(reqwest::Client::new(), microsoft_tokens(&server))
        .with_base_url(server.uri());
    calendar
        .create_event(&CalendarEvent {
            title: "Standup".to_string(),
            start_time: "2024-01-02T10:00:00+01:00".to_string(),
            end_time: "2024-01-02T10:15:00+01:00".to_string(),
            id: String::new(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_remove_requires_id() {
    let server = MockServer::start().await;
    let calendar = MicrosoftCalendar::new(reqwest::Client::new(), microsoft_tokens(&server))
        .with_base_url(server.uri());

    let err = calendar
        .remove_event(&CalendarEvent {
            title: "Standup".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

// ─── Gmail ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_gmail_lists_and_renders_messages() {
    use base64::{engine::general_purpose::URL_SAFE, Engine as _};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "a" }, { "id": "broken" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/a"))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "internalDate": "1704186000000",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    { "name": "Subject", "value": "Lunch?" },
                    { "name": "From", "value": "bob@example.com" }
                ],
                "body": { "data": URL_SAFE.encode("Noon works\nsee you") }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gmail = GmailClient::new(reqwest::Client::new(), google_tokens(&server, test_token()))
        .with_base_url(server.uri());
    let (start, end) = window();
    let emails = gmail.list_emails(start, end).await.unwrap();

    assert_eq!(emails.len(), 2);
    let first = emails[0].as_ref().unwrap();
    assert_eq!(first.subject, "Lunch? From: bob@example.com");
    assert_eq!(first.send_at, "2024-01-02T09:00:00Z");
    assert!(first.body.contains("Noon works<br />"));
    assert!(emails[1].is_none());
}

// ─── Gemini ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_gemini_concatenates_candidates_in_order() {
    use calendar_assistant::services::chat::{ChatMessage, ChatRole};
    use calendar_assistant::services::gemini::GenerateRequest;
    use calendar_assistant::services::{GeminiClient, LlmClient};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test_gemini_key"))
        .and(body_partial_json(json!({
            "systemInstruction": { "parts": [{ "text": "Be brief." }] },
            "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1," }] } },
                { "content": { "parts": [{ "text": "\"b\":2}" }] } }
            ]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(reqwest::Client::new(), &server.uri(), "test_gemini_key");
    let parts = client
        .generate(&GenerateRequest {
            model: "gemini-1.5-flash".to_string(),
            system_instruction: "Be brief.".to_string(),
            contents: vec![ChatMessage {
                role: ChatRole::User,
                parts: vec!["hi".to_string()],
            }],
            temperature: 0.7,
            response_mime_type: "application/json".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(parts.concat(), "{\"a\":1,\"b\":2}");
}
