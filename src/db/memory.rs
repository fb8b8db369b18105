// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory user store.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{AuthProvider, Subscription, User};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(email).map(|u| u.clone()))
    }

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.provider == Some(provider) && u.provider_id.as_deref() == Some(provider_id))
            .map(|u| u.clone()))
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .iter()
            .find(|u| {
                u.subscription
                    .as_ref()
                    .is_some_and(|s| s.external_id == subscription_id)
            })
            .map(|u| u.clone()))
    }

    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        match self.users.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "User {} already exists",
                user.email
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn update_oauth_link(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
        oauth_token_encrypted: &str,
    ) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(email)
            .ok_or_else(|| AppError::NotFound(format!("User {}", email)))?;
        user.provider = Some(provider);
        user.provider_id = Some(provider_id.to_string());
        user.oauth_token_encrypted = Some(oauth_token_encrypted.to_string());
        Ok(())
    }

    async fn update_subscription(
        &self,
        email: &str,
        subscription: &Subscription,
    ) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(email)
            .ok_or_else(|| AppError::NotFound(format!("User {}", email)))?;
        user.subscription = Some(subscription.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingProvider, Tier};

    #[tokio::test]
    async fn test_create_conflict() {
        let store = MemoryUserStore::new();
        let user = User::with_password("a@example.com", "hash".to_string());
        store.create_user(&user).await.unwrap();
        let err = store.create_user(&user).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_subscription_id() {
        let store = MemoryUserStore::new();
        let user = User::with_password("a@example.com", "hash".to_string());
        store.create_user(&user).await.unwrap();
        store
            .update_subscription(
                "a@example.com",
                &Subscription {
                    provider: BillingProvider::Paypal,
                    status: "ACTIVE".to_string(),
                    plan: Some(Tier::Basic),
                    external_id: "I-123".to_string(),
                },
            )
            .await
            .unwrap();

        let found = store.find_by_subscription_id("I-123").await.unwrap();
        assert_eq!(found.map(|u| u.email), Some("a@example.com".to_string()));
        assert!(store.find_by_subscription_id("I-999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = MemoryUserStore::new();
        let err = store
            .update_oauth_link("nobody@example.com", AuthProvider::Google, "1", "blob")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
