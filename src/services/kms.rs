// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for encrypting the stored OAuth credential.
//!
//! The user's email is bound to every ciphertext as additional authenticated
//! data, so a blob copied onto another user record fails to decrypt.

use crate::error::AppError;
use crate::models::OAuthToken;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,
    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    const KEY_RING_NAME: &str = "calendar-assistant";
    pub const TOKEN_KEY_NAME: &str = "oauth-tokens";

    /// Connect to GCP KMS.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, AppError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Offline KMS for tests and local runs (base64 only).
    /// Only available in debug/test builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    /// Encrypt plaintext bound to `aad`. Returns base64-encoded ciphertext.
    pub async fn encrypt(&self, plaintext: &str, aad: &[u8]) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                let _ = aad;
                return Ok(BASE64.encode(plaintext));
            }
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: aad.to_vec(),
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Decrypt base64 ciphertext that was encrypted with the same `aad`.
    pub async fn decrypt(&self, ciphertext_b64: &str, aad: &[u8]) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                let _ = aad;
                let bytes = BASE64.decode(ciphertext_b64).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("Base64 decode failed (mock): {}", e))
                })?;
                return String::from_utf8(bytes).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e))
                });
            }
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Base64 decode failed: {}", e)))?;

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            additional_authenticated_data: aad.to_vec(),
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

/// Serialize and encrypt an OAuth credential for storage on a user record.
pub async fn encrypt_token(
    kms: &KmsService,
    token: &OAuthToken,
    email: &str,
) -> Result<String, AppError> {
    let json = serde_json::to_string(token)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Token serialization failed: {}", e)))?;
    kms.encrypt(&json, email.as_bytes()).await
}

/// Decrypt and deserialize a stored OAuth credential.
///
/// Anything that is not a valid credential is reported as
/// `AppError::ProviderCredential`.
pub async fn decrypt_token(
    kms: &KmsService,
    encrypted: &str,
    email: &str,
) -> Result<OAuthToken, AppError> {
    let json = kms
        .decrypt(encrypted, email.as_bytes())
        .await
        .map_err(|e| AppError::ProviderCredential(format!("stored token unreadable: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| AppError::ProviderCredential(format!("stored token malformed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_token_roundtrip() {
        let kms = KmsService::new_mock();
        let token = OAuthToken {
            access_token: "at".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("rt".to_string()),
            expiry: None,
        };
        let blob = encrypt_token(&kms, &token, "a@example.com").await.unwrap();
        assert_ne!(blob, "at");
        let back = decrypt_token(&kms, &blob, "a@example.com").await.unwrap();
        assert_eq!(back, token);
    }

    #[tokio::test]
    async fn test_malformed_blob_is_provider_credential_error() {
        let kms = KmsService::new_mock();
        let blob = kms.encrypt("not json", b"a@example.com").await.unwrap();
        let err = decrypt_token(&kms, &blob, "a@example.com").await.unwrap_err();
        assert!(err.is_provider_credential_error());

        let err = decrypt_token(&kms, "%%%", "a@example.com").await.unwrap_err();
        assert!(err.is_provider_credential_error());
    }
}
