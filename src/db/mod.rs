// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer.
//!
//! Business logic talks to the `UserStore` trait; `FirestoreDb` is the
//! production implementation and `MemoryUserStore` backs tests and local runs.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryUserStore;

use crate::error::AppError;
use crate::models::{AuthProvider, Subscription, User};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
}

/// Access to user records keyed by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError>;

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// Create a new user. Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    /// Link an existing user to an OAuth identity and store its credential.
    async fn update_oauth_link(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
        oauth_token_encrypted: &str,
    ) -> Result<(), AppError>;

    /// Replace the subscription fields of a user in a single write.
    async fn update_subscription(
        &self,
        email: &str,
        subscription: &Subscription,
    ) -> Result<(), AppError>;
}
