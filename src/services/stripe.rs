// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe REST client and webhook signature verification.

use crate::error::AppError;
use crate::services::http::{check_response_json, send_error, Credential};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const VENDOR: &str = "Stripe";

/// Webhook timestamps older than this are rejected.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub customer: Option<String>,
}

/// Webhook event envelope (subscription events only).
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, base_url: &str, secret_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// Create a customer, optionally attaching a payment source token.
    pub async fn create_customer(
        &self,
        email: &str,
        source: Option<&str>,
    ) -> Result<StripeCustomer, AppError> {
        let mut form = vec![("email", email)];
        if let Some(source) = source {
            form.push(("source", source));
        }
        self.post_form("/v1/customers", &form).await
    }

    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> Result<StripeSubscription, AppError> {
        self.post_form(
            "/v1/subscriptions",
            &[("customer", customer_id), ("items[0][price]", price_id)],
        )
        .await
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, AppError> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.base_url,
            urlencoding::encode(subscription_id)
        );
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;
        check_response_json(VENDOR, Credential::Service, response).await
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;
        check_response_json(VENDOR, Credential::Service, response).await
    }
}

/// Compute the `v1` signature for a payload at a timestamp.
pub fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`).
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_secs: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for item in header.split(',') {
        match item.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
    if now_secs.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(AppError::InvalidSignature);
    }

    let expected = compute_signature(payload, secret, timestamp)?;
    let matched = signatures
        .iter()
        .any(|sig| bool::from(sig.as_bytes().ct_eq(expected.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}
