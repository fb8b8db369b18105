// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gemini `generateContent` REST client.

use crate::error::AppError;
use crate::services::chat::{ChatMessage, ChatRole};
use crate::services::http::{check_response_json, send_error, Credential};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const VENDOR: &str = "Gemini";

/// One generation call: model, system prompt and full conversation.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: String,
    pub contents: Vec<ChatMessage>,
    pub temperature: f32,
    pub response_mime_type: String,
}

/// Text generation backend used by chat sessions.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the text parts of all candidates in vendor order.
    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<String>, AppError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<String>, AppError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );

        let body = WireRequest {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart {
                    text: request.system_instruction.clone(),
                }],
            },
            contents: request
                .contents
                .iter()
                .map(|m| WireContent {
                    role: Some(m.role),
                    parts: m
                        .parts
                        .iter()
                        .map(|p| WirePart { text: p.clone() })
                        .collect(),
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_mime_type: request.response_mime_type.clone(),
            },
        };

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout(format!("{} request timed out", VENDOR))
                } else {
                    send_error(VENDOR, e)
                }
            })?;

        let parsed: WireResponse =
            check_response_json(VENDOR, Credential::Service, response).await?;

        Ok(parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect())
    }
}

/// Stand-in used when no Gemini API key is configured.
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn generate(&self, _request: &GenerateRequest) -> Result<Vec<String>, AppError> {
        Err(AppError::Upstream(format!("{} API key is not configured", VENDOR)))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<ChatRole>,
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
struct WirePart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: String,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireCandidateContent>,
}

#[derive(Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireCandidatePart>,
}

#[derive(Deserialize)]
struct WireCandidatePart {
    #[serde(default)]
    text: Option<String>,
}
