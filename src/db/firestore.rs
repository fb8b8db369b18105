// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed user store.
//!
//! Users live in a single `users` collection keyed by email. Subscription and
//! OAuth-link changes are field-mask updates so each lifecycle transition is
//! one document write.

use crate::db::{collections, UserStore};
use crate::error::AppError;
use crate::models::{AuthProvider, Subscription, User};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::paths;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client; every operation returns `AppError::Database`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Fetch a user that must exist before a masked update.
    async fn require_user(&self, email: &str) -> Result<User, AppError> {
        self.get_user(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", email)))
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn get_user(&self, email: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(email)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| {
                q.for_all([
                    q.field("provider").eq(provider.as_str()),
                    q.field("provider_id").eq(provider_id),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().next())
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<User>, AppError> {
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("subscription.external_id").eq(subscription_id)]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().next())
    }

    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let result: Result<User, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(&user.email)
            .object(user)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(FirestoreError::DataConflictError(_)) => Err(AppError::Conflict(format!(
                "User {} already exists",
                user.email
            ))),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn update_oauth_link(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
        oauth_token_encrypted: &str,
    ) -> Result<(), AppError> {
        let mut user = self.require_user(email).await?;
        user.provider = Some(provider);
        user.provider_id = Some(provider_id.to_string());
        user.oauth_token_encrypted = Some(oauth_token_encrypted.to_string());

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{provider, provider_id, oauth_token_encrypted}))
            .in_col(collections::USERS)
            .document_id(email)
            .object(&user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_subscription(
        &self,
        email: &str,
        subscription: &Subscription,
    ) -> Result<(), AppError> {
        let mut user = self.require_user(email).await?;
        user.subscription = Some(subscription.clone());

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{subscription}))
            .in_col(collections::USERS)
            .document_id(email)
            .object(&user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            email,
            status = %subscription.status,
            subscription_id = %subscription.external_id,
            "Subscription updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_client_reports_database_error() {
        let db = FirestoreDb::new_mock();
        let err = db.get_user("a@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
