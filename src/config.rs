// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Only the session signing key and the Google OAuth client are required.
//! Microsoft login, Stripe, PayPal and Gemini are enabled when their
//! credentials are present.

use hkdf::Hkdf;
use sha2::Sha256;
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Server ---
    pub port: u16,
    /// Public base URL of this service, used for OAuth and PayPal return URLs
    pub base_url: String,
    pub gcp_project_id: String,
    pub gcp_region: String,
    /// Path of the JSON file describing the billing plans
    pub subscriptions_file: String,

    // --- Session ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for OAuth state parameters
    pub oauth_state_key: Vec<u8>,

    // --- OAuth providers ---
    pub google_client_id: String,
    pub google_client_secret: String,
    pub microsoft_client_id: Option<String>,
    pub microsoft_client_secret: Option<String>,
    pub microsoft_tenant_id: String,

    // --- Stripe ---
    pub stripe_secret_key: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_base: String,

    // --- PayPal ---
    pub paypal_client_id: Option<String>,
    pub paypal_client_secret: Option<String>,
    pub paypal_webhook_id: Option<String>,
    /// "live" or "sandbox"
    pub paypal_mode: String,
    pub paypal_api_base: String,

    // --- Gemini ---
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    /// Upper bound for one LLM round trip
    pub chat_timeout_secs: u64,
}

const PAYPAL_LIVE_BASE: &str = "https://api-m.paypal.com";
const PAYPAL_SANDBOX_BASE: &str = "https://api-m.sandbox.paypal.com";

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let jwt_signing_key = required("JWT_SIGNING_KEY")?.into_bytes();
        let oauth_state_key = match optional("OAUTH_STATE_KEY") {
            Some(key) => key.into_bytes(),
            None => derive_state_key(&jwt_signing_key)?,
        };

        let paypal_mode = optional("PAYPAL_MODE").unwrap_or_else(|| "sandbox".to_string());
        let paypal_api_base = optional("PAYPAL_API_BASE").unwrap_or_else(|| {
            if paypal_mode == "live" {
                PAYPAL_LIVE_BASE.to_string()
            } else {
                PAYPAL_SANDBOX_BASE.to_string()
            }
        });

        Ok(Self {
            port: match optional("PORT") {
                Some(p) => p.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
                None => 8080,
            },
            base_url: optional("BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            gcp_project_id: optional("GCP_PROJECT_ID").unwrap_or_else(|| "local-dev".to_string()),
            gcp_region: optional("GCP_REGION").unwrap_or_else(|| "us-west1".to_string()),
            subscriptions_file: optional("SUBSCRIPTIONS_FILE")
                .unwrap_or_else(|| "paypal.json".to_string()),

            jwt_signing_key,
            oauth_state_key,

            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            microsoft_client_id: optional("MICROSOFT_CLIENT_ID"),
            microsoft_client_secret: optional("MICROSOFT_CLIENT_SECRET"),
            microsoft_tenant_id: optional("MICROSOFT_TENANT_ID")
                .unwrap_or_else(|| "common".to_string()),

            stripe_secret_key: optional("STRIPE_SECRET_KEY"),
            stripe_publishable_key: optional("STRIPE_PUBLISHABLE_KEY"),
            stripe_price_id: optional("STRIPE_PRICE_ID"),
            stripe_webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base: optional("STRIPE_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),

            paypal_client_id: optional("PAYPAL_CLIENT_ID"),
            paypal_client_secret: optional("PAYPAL_SECRET"),
            paypal_webhook_id: optional("PAYPAL_WEBHOOK_ID"),
            paypal_mode,
            paypal_api_base,

            gemini_api_key: optional("GEMINI_SECRET_KEY"),
            gemini_api_base: optional("GEMINI_API_BASE")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            chat_timeout_secs: match optional("CHAT_TIMEOUT_SECS") {
                Some(s) => s
                    .parse()
                    .map_err(|_| ConfigError::Invalid("CHAT_TIMEOUT_SECS"))?,
                None => 30,
            },
        })
    }

    /// Config for tests. Every vendor integration is configured but points
    /// at unroutable hosts unless a test overrides the base URL.
    pub fn test_default() -> Self {
        let jwt_signing_key = b"test_jwt_key_32_bytes_minimum!!".to_vec();
        Self {
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            subscriptions_file: "paypal.json".to_string(),
            oauth_state_key: b"test_oauth_state_key_32_bytes!!!".to_vec(),
            jwt_signing_key,
            google_client_id: "test_google_client".to_string(),
            google_client_secret: "test_google_secret".to_string(),
            microsoft_client_id: Some("test_ms_client".to_string()),
            microsoft_client_secret: Some("test_ms_secret".to_string()),
            microsoft_tenant_id: "common".to_string(),
            stripe_secret_key: Some("sk_test_123".to_string()),
            stripe_publishable_key: Some("pk_test_123".to_string()),
            stripe_price_id: Some("price_test_premium".to_string()),
            stripe_webhook_secret: Some("whsec_test".to_string()),
            stripe_api_base: "http://127.0.0.1:9".to_string(),
            paypal_client_id: Some("test_paypal_client".to_string()),
            paypal_client_secret: Some("test_paypal_secret".to_string()),
            paypal_webhook_id: Some("WH-TEST".to_string()),
            paypal_mode: "sandbox".to_string(),
            paypal_api_base: "http://127.0.0.1:9".to_string(),
            gemini_api_key: Some("test_gemini_key".to_string()),
            gemini_api_base: "http://127.0.0.1:9".to_string(),
            chat_timeout_secs: 30,
        }
    }

    /// Whether session cookies may omit the `Secure` attribute.
    pub fn is_local(&self) -> bool {
        self.base_url.starts_with("http://localhost") || self.base_url.starts_with("http://127.0.0.1")
    }

    pub fn microsoft_enabled(&self) -> bool {
        self.microsoft_client_id.is_some() && self.microsoft_client_secret.is_some()
    }

    pub fn paypal_enabled(&self) -> bool {
        self.paypal_client_id.is_some() && self.paypal_client_secret.is_some()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Derive a dedicated OAuth state key so the JWT key is never used for two purposes.
fn derive_state_key(jwt_signing_key: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let hk = Hkdf::<Sha256>::new(None, jwt_signing_key);
    let mut okm = [0u8; 32];
    hk.expand(b"oauth-state", &mut okm)
        .map_err(|_| ConfigError::Invalid("OAUTH_STATE_KEY"))?;
    Ok(okm.to_vec())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
