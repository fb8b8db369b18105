// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use crate::models::Subscription;
use serde::{Deserialize, Serialize};

/// OAuth identity provider a user signed in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    Microsoft,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google",
            AuthProvider::Microsoft => "microsoft",
        }
    }

    /// Parse the provider segment used in `/auth/{provider}/...` paths.
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "google" => Some(AuthProvider::Google),
            "microsoft" => Some(AuthProvider::Microsoft),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User profile stored in Firestore (document ID is the email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    /// Argon2 PHC string; absent for OAuth-only users
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub provider: Option<AuthProvider>,
    /// Provider-assigned account ID
    #[serde(default)]
    pub provider_id: Option<String>,
    /// KMS-encrypted, JSON-serialized `OAuthToken` (base64)
    #[serde(default)]
    pub oauth_token_encrypted: Option<String>,
    #[serde(default)]
    pub subscription: Option<Subscription>,
    pub created_at: String,
}

impl User {
    /// New local account with a password hash.
    pub fn with_password(email: &str, password_hash: String) -> Self {
        Self {
            email: email.to_string(),
            password_hash: Some(password_hash),
            provider: None,
            provider_id: None,
            oauth_token_encrypted: None,
            subscription: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// New account created by an OAuth login.
    pub fn with_oauth(
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
        oauth_token_encrypted: String,
    ) -> Self {
        Self {
            email: email.to_string(),
            password_hash: None,
            provider: Some(provider),
            provider_id: Some(provider_id.to_string()),
            oauth_token_encrypted: Some(oauth_token_encrypted),
            subscription: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Tier of an active subscription with a known plan.
    pub fn tier(&self) -> Option<crate::models::Tier> {
        self.subscription
            .as_ref()
            .filter(|s| s.is_active())
            .and_then(|s| s.plan)
    }
}
