// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Start `gcloud emulators firestore start` and set FIRESTORE_EMULATOR_HOST.

use calendar_assistant::db::UserStore;
use calendar_assistant::error::AppError;
use calendar_assistant::models::{AuthProvider, BillingProvider, Subscription, Tier, User};

mod common;
use common::test_db;

/// Unique email per test run so tests don't collide in the emulator.
fn unique_email(label: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}@example.com", label, nanos)
}

#[tokio::test]
async fn test_create_and_get_user() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("create");

    assert!(db.get_user(&email).await.unwrap().is_none());

    db.create_user(&User::with_password(&email, "$argon2id$hash".to_string()))
        .await
        .unwrap();

    let user = db.get_user(&email).await.unwrap().unwrap();
    assert_eq!(user.email, email);
    assert_eq!(user.password_hash.as_deref(), Some("$argon2id$hash"));
    assert!(user.subscription.is_none());
}

#[tokio::test]
async fn test_duplicate_user_conflicts() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("dup");
    let user = User::with_password(&email, "$argon2id$hash".to_string());

    db.create_user(&user).await.unwrap();
    let err = db.create_user(&user).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_oauth_link_and_provider_lookup() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("link");
    let provider_id = format!("ms-{}", email);

    db.create_user(&User::with_password(&email, "$argon2id$hash".to_string()))
        .await
        .unwrap();
    db.update_oauth_link(&email, AuthProvider::Microsoft, &provider_id, "blob")
        .await
        .unwrap();

    let found = db
        .find_by_provider_id(AuthProvider::Microsoft, &provider_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.email, email);
    assert_eq!(found.oauth_token_encrypted.as_deref(), Some("blob"));
    // Masked update leaves the password hash alone
    assert!(found.password_hash.is_some());

    assert!(db
        .find_by_provider_id(AuthProvider::Google, &provider_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_subscription_update_and_lookup() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("sub");
    let external_id = format!("I-{}", email);

    db.create_user(&User::with_oauth(
        &email,
        AuthProvider::Google,
        "g-1",
        "blob".to_string(),
    ))
    .await
    .unwrap();

    let subscription = Subscription {
        provider: BillingProvider::Paypal,
        status: "ACTIVE".to_string(),
        plan: Some(Tier::Basic),
        external_id: external_id.clone(),
    };
    db.update_subscription(&email, &subscription).await.unwrap();

    let user = db
        .find_by_subscription_id(&external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.email, email);
    assert_eq!(user.tier(), Some(Tier::Basic));
}

#[tokio::test]
async fn test_update_missing_user_not_found() {
    require_emulator!();

    let db = test_db().await;
    let err = db
        .update_oauth_link(&unique_email("ghost"), AuthProvider::Google, "g", "blob")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
