// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth 2.0 clients for Google and Microsoft sign-in.
//!
//! Handles:
//! - Authorization URL construction and signed `state` parameters
//! - Authorization code exchange and token refresh
//! - Fetching the provider account identity (ID and email)

use crate::config::Config;
use crate::error::AppError;
use crate::models::{AuthProvider, OAuthToken};
use crate::services::http::{check_response_json, send_error, Credential};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

/// OAuth state tokens are accepted for 15 minutes.
pub const STATE_TTL_MS: i64 = 15 * 60 * 1000;

const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/gmail.readonly",
];

const MICROSOFT_SCOPES: &[&str] = &[
    "openid",
    "offline_access",
    "User.Read",
    "profile",
    "email",
    "Calendars.ReadWrite",
];

/// Provider endpoints. Overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Identity of the signed-in provider account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub id: String,
    pub email: String,
    /// The provider vouches for `email`. Only then may it match a local account.
    pub email_verified: bool,
}

/// OAuth client for one provider.
pub struct OAuthProvider {
    kind: AuthProvider,
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    scopes: &'static [&'static str],
    endpoints: OAuthEndpoints,
}

impl OAuthProvider {
    pub fn google(config: &Config, http: reqwest::Client) -> Self {
        Self {
            kind: AuthProvider::Google,
            http,
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            redirect_url: format!("{}/auth/google/callback", config.base_url),
            scopes: GOOGLE_SCOPES,
            endpoints: OAuthEndpoints {
                auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            },
        }
    }

    /// Returns `None` when Microsoft credentials are not configured.
    pub fn microsoft(config: &Config, http: reqwest::Client) -> Option<Self> {
        let client_id = config.microsoft_client_id.clone()?;
        let client_secret = config.microsoft_client_secret.clone()?;
        let authority = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0",
            config.microsoft_tenant_id
        );
        Some(Self {
            kind: AuthProvider::Microsoft,
            http,
            client_id,
            client_secret,
            redirect_url: format!("{}/auth/microsoft/callback", config.base_url),
            scopes: MICROSOFT_SCOPES,
            endpoints: OAuthEndpoints {
                auth_url: format!("{}/authorize", authority),
                token_url: format!("{}/token", authority),
                userinfo_url: "https://graph.microsoft.com/v1.0/me".to_string(),
            },
        })
    }

    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn kind(&self) -> AuthProvider {
        self.kind
    }

    /// URL of the provider consent page.
    pub fn authorize_url(&self, state: &str) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.endpoints.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(&self.scopes.join(" ")),
            urlencoding::encode(state),
        );
        match self.kind {
            AuthProvider::Google => url.push_str("&access_type=offline&prompt=consent"),
            AuthProvider::Microsoft => url.push_str("&response_mode=query"),
        }
        url
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken, AppError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| send_error(self.kind.as_str(), e))?;

        let token: TokenResponse =
            check_response_json(self.kind.as_str(), Credential::Service, response).await?;
        Ok(token.into_token(None))
    }

    /// Refresh an access token. The old refresh token is kept if the
    /// provider does not rotate it.
    pub async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, AppError> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            AppError::ProviderCredential("access token expired and no refresh token".to_string())
        })?;

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| send_error(self.kind.as_str(), e))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.kind, status = %status, body = %body, "Token refresh rejected");
            return Err(AppError::ProviderCredential(format!(
                "{} refused to refresh the token",
                self.kind
            )));
        }

        let refreshed: TokenResponse =
            check_response_json(self.kind.as_str(), Credential::Service, response).await?;
        Ok(refreshed.into_token(Some(refresh_token)))
    }

    /// Fetch the provider account ID and email for a fresh token.
    pub async fn fetch_identity(&self, token: &OAuthToken) -> Result<ProviderIdentity, AppError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| send_error(self.kind.as_str(), e))?;

        let info: UserInfo =
            check_response_json(self.kind.as_str(), Credential::User, response).await?;

        // Graph `mail` and `userPrincipalName` are tenant-controlled, so a
        // Microsoft address is never treated as verified.
        let email_verified = match self.kind {
            AuthProvider::Google => {
                info.verified_email.or(info.email_verified).unwrap_or(false)
            }
            AuthProvider::Microsoft => false,
        };

        let email = info
            .email
            .or(info.mail)
            .or(info.user_principal_name)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                AppError::Upstream(format!("{} account has no email address", self.kind))
            })?;

        Ok(ProviderIdentity {
            id: info.id,
            email,
            email_verified,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<&str>) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expiry: self.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        }
    }
}

/// Google userinfo v2 and Graph `/me` share enough shape for one struct.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default, rename = "verified_email")]
    verified_email: Option<bool>,
    #[serde(default, rename = "email_verified")]
    email_verified: Option<bool>,
}

/// A user's OAuth credential with refresh-on-expiry.
pub struct TokenSource {
    provider: Arc<OAuthProvider>,
    token: Mutex<OAuthToken>,
}

impl TokenSource {
    pub fn new(provider: Arc<OAuthProvider>, token: OAuthToken) -> Self {
        Self {
            provider,
            token: Mutex::new(token),
        }
    }

    /// Current access token, refreshed once if it has expired.
    pub async fn access_token(&self) -> Result<String, AppError> {
        let mut token = self.token.lock().await;
        if token.is_expired(Utc::now()) {
            let refreshed = self.provider.refresh(&token).await?;
            tracing::info!(provider = %self.provider.kind(), "OAuth access token refreshed");
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }
}

// ─── State parameter ─────────────────────────────────────────────────────────

/// Random nonce bound to the browser through a cookie.
pub fn generate_nonce() -> Result<String, AppError> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(hex::encode(bytes))
}

/// Build a signed state: base64url("provider|nonce|timestamp_hex|hmac_hex").
pub fn sign_state(
    provider: AuthProvider,
    nonce: &str,
    timestamp_ms: i64,
    key: &[u8],
) -> Result<String, AppError> {
    let payload = format!("{}|{}|{:x}", provider.as_str(), nonce, timestamp_ms);
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify a state returned by the provider against the nonce cookie.
///
/// Rejects bad signatures, another provider's state, a nonce that does not
/// match the cookie, and states older than `STATE_TTL_MS`.
pub fn verify_state(
    state: &str,
    provider: AuthProvider,
    nonce: &str,
    now_ms: i64,
    key: &[u8],
) -> Result<(), AppError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(state)
        .map_err(|_| AppError::InvalidToken)?;
    let decoded = String::from_utf8(bytes).map_err(|_| AppError::InvalidToken)?;

    let parts: Vec<&str> = decoded.split('|').collect();
    let &[state_provider, state_nonce, timestamp_hex, signature_hex] = parts.as_slice() else {
        return Err(AppError::InvalidToken);
    };

    let signature = hex::decode(signature_hex).map_err(|_| AppError::InvalidToken)?;
    let payload = format!("{}|{}|{}", state_provider, state_nonce, timestamp_hex);
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    if mac.verify_slice(&signature).is_err() {
        tracing::warn!("OAuth state signature mismatch");
        return Err(AppError::InvalidToken);
    }

    if state_provider != provider.as_str() || state_nonce != nonce {
        tracing::warn!(provider = %provider, "OAuth state does not match this login");
        return Err(AppError::InvalidToken);
    }

    let issued_ms = i64::from_str_radix(timestamp_hex, 16).map_err(|_| AppError::InvalidToken)?;
    if now_ms - issued_ms > STATE_TTL_MS || issued_ms > now_ms {
        tracing::info!(provider = %provider, "OAuth state expired");
        return Err(AppError::InvalidToken);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"state_key";

    #[test]
    fn test_state_roundtrip() {
        let now = 1_700_000_000_000;
        let state = sign_state(AuthProvider::Google, "abcd", now, KEY).unwrap();
        assert!(verify_state(&state, AuthProvider::Google, "abcd", now + 1000, KEY).is_ok());
    }

    #[test]
    fn test_state_rejections() {
        let now = 1_700_000_000_000;
        let state = sign_state(AuthProvider::Google, "abcd", now, KEY).unwrap();

        // wrong key
        assert!(verify_state(&state, AuthProvider::Google, "abcd", now, b"other").is_err());
        // wrong provider
        assert!(verify_state(&state, AuthProvider::Microsoft, "abcd", now, KEY).is_err());
        // wrong nonce
        assert!(verify_state(&state, AuthProvider::Google, "ffff", now, KEY).is_err());
        // expired
        assert!(
            verify_state(&state, AuthProvider::Google, "abcd", now + STATE_TTL_MS + 1, KEY)
                .is_err()
        );
        // garbage
        assert!(verify_state("!!!", AuthProvider::Google, "abcd", now, KEY).is_err());
        let malformed = URL_SAFE_NO_PAD.encode("google|abcd");
        assert!(verify_state(&malformed, AuthProvider::Google, "abcd", now, KEY).is_err());
    }

    #[test]
    fn test_nonce_is_random_hex() {
        let a = generate_nonce().unwrap();
        let b = generate_nonce().unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_authorize_url() {
        let config = Config::test_default();
        let http = reqwest::Client::new();

        let google = OAuthProvider::google(&config, http.clone());
        let url = google.authorize_url("st");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("state=st"));
        assert!(url.contains(&*urlencoding::encode("http://localhost:8080/auth/google/callback")));

        let microsoft = OAuthProvider::microsoft(&config, http).unwrap();
        let url = microsoft.authorize_url("st");
        assert!(url.starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize?"));
        assert!(url.contains("offline_access"));
    }
}
