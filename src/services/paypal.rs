// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PayPal REST client (catalog, billing plans, subscriptions, webhooks).
//!
//! Handles:
//! - Client-credentials access token, cached until shortly before expiry
//! - Product and plan creation for the plan catalog
//! - Subscription creation, details, cancel, activate and suspend
//! - Webhook verification through `verify-webhook-signature`

use crate::error::AppError;
use crate::models::SubscriptionConfig;
use crate::services::http::{check_response, check_response_json, send_error, Credential};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

const VENDOR: &str = "PayPal";

/// Refresh the API token this long before PayPal expires it.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct PayPalClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

/// Transmission headers PayPal sends with every webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedSubscription {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl CreatedSubscription {
    /// URL the buyer must visit to approve the subscription.
    pub fn approval_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionDetails {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub billing_info: Option<BillingInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingInfo {
    #[serde(default)]
    pub next_billing_time: Option<String>,
    #[serde(default)]
    pub last_payment: Option<LastPayment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPayment {
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Money {
    pub currency_code: String,
    pub value: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Deserialize)]
struct VerificationResponse {
    verification_status: String,
}

impl PayPalClient {
    pub fn new(http: reqwest::Client, base_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Access token for API calls, fetched on first use and cached.
    async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;

        let fresh: TokenResponse =
            check_response_json(VENDOR, Credential::Service, response).await?;
        *cached = Some(CachedToken {
            access_token: fresh.access_token.clone(),
            expires_at: now + Duration::seconds(fresh.expires_in),
        });
        tracing::debug!("PayPal access token refreshed");
        Ok(fresh.access_token)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, AppError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;
        check_response_json(VENDOR, Credential::Service, response).await
    }

    /// POST that answers 204 No Content.
    async fn post_action(&self, path: &str, body: &serde_json::Value) -> Result<(), AppError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;
        check_response(VENDOR, Credential::Service, response).await?;
        Ok(())
    }

    pub async fn create_product(&self, config: &SubscriptionConfig) -> Result<String, AppError> {
        let mut body = json!({
            "name": config.product_name,
            "description": config.product_description,
            "type": config.product_type,
        });
        if let Some(category) = &config.product_category {
            body["category"] = json!(category);
        }
        let created: CreatedResource = self.post_json("/v1/catalogs/products", &body).await?;
        Ok(created.id)
    }

    /// Create an active monthly/yearly billing plan for a product.
    pub async fn create_plan(
        &self,
        product_id: &str,
        config: &SubscriptionConfig,
    ) -> Result<String, AppError> {
        let body = json!({
            "product_id": product_id,
            "name": config.plan_name,
            "description": config.plan_description,
            "status": "ACTIVE",
            "billing_cycles": [{
                "frequency": { "interval_unit": config.interval, "interval_count": 1 },
                "tenure_type": "REGULAR",
                "sequence": 1,
                "total_cycles": 0,
                "pricing_scheme": {
                    "fixed_price": { "value": config.price, "currency_code": config.currency }
                }
            }],
            "payment_preferences": {
                "auto_bill_outstanding": true,
                "setup_fee_failure_action": "CONTINUE",
                "payment_failure_threshold": 3
            },
            "taxes": { "percentage": "19.0", "inclusive": true }
        });
        let created: CreatedResource = self.post_json("/v1/billing/plans", &body).await?;
        Ok(created.id)
    }

    /// Create a subscription awaiting buyer approval. `custom_id` carries
    /// the subscriber's email so webhooks can be matched back to the user.
    pub async fn create_subscription(
        &self,
        plan_id: &str,
        brand_name: &str,
        return_url: &str,
        cancel_url: &str,
        custom_id: &str,
    ) -> Result<CreatedSubscription, AppError> {
        let body = json!({
            "plan_id": plan_id,
            "custom_id": custom_id,
            "application_context": {
                "brand_name": brand_name,
                "user_action": "SUBSCRIBE_NOW",
                "return_url": return_url,
                "cancel_url": cancel_url
            }
        });
        self.post_json("/v1/billing/subscriptions", &body).await
    }

    pub async fn subscription_details(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionDetails, AppError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!(
                "{}/v1/billing/subscriptions/{}",
                self.base_url,
                urlencoding::encode(subscription_id)
            ))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(VENDOR, e))?;
        check_response_json(VENDOR, Credential::Service, response).await
    }

    pub async fn cancel_subscription(&self, subscription_id: &str, reason: &str) -> Result<(), AppError> {
        self.subscription_action(subscription_id, "cancel", reason).await
    }

    pub async fn activate_subscription(&self, subscription_id: &str, reason: &str) -> Result<(), AppError> {
        self.subscription_action(subscription_id, "activate", reason).await
    }

    pub async fn suspend_subscription(&self, subscription_id: &str, reason: &str) -> Result<(), AppError> {
        self.subscription_action(subscription_id, "suspend", reason).await
    }

    async fn subscription_action(
        &self,
        subscription_id: &str,
        action: &str,
        reason: &str,
    ) -> Result<(), AppError> {
        let path = format!(
            "/v1/billing/subscriptions/{}/{}",
            urlencoding::encode(subscription_id),
            action
        );
        self.post_action(&path, &json!({ "reason": reason })).await?;
        tracing::info!(subscription_id, action, "PayPal subscription updated");
        Ok(())
    }

    /// Ask PayPal whether a webhook delivery is authentic and return the
    /// verified event.
    ///
    /// A body that is not JSON, missing transmission headers, and any answer
    /// other than `SUCCESS` are all `AppError::InvalidSignature`.
    pub async fn verify_webhook_signature(
        &self,
        headers: &WebhookHeaders,
        webhook_id: &str,
        payload: &[u8],
    ) -> Result<serde_json::Value, AppError> {
        if headers.transmission_id.is_empty() || headers.transmission_sig.is_empty() {
            tracing::warn!("PayPal webhook without transmission headers");
            return Err(AppError::InvalidSignature);
        }
        let event: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Unverifiable PayPal webhook payload");
            AppError::InvalidSignature
        })?;

        let body = json!({
            "auth_algo": headers.auth_algo,
            "cert_url": headers.cert_url,
            "transmission_id": headers.transmission_id,
            "transmission_sig": headers.transmission_sig,
            "transmission_time": headers.transmission_time,
            "webhook_id": webhook_id,
            "webhook_event": event,
        });
        let verification: VerificationResponse = self
            .post_json("/v1/notifications/verify-webhook-signature", &body)
            .await?;

        if verification.verification_status == "SUCCESS" {
            Ok(event)
        } else {
            tracing::warn!(
                status = %verification.verification_status,
                transmission_id = %headers.transmission_id,
                "PayPal webhook verification failed"
            );
            Err(AppError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_url() {
        let created: CreatedSubscription = serde_json::from_value(json!({
            "id": "I-1",
            "status": "APPROVAL_PENDING",
            "links": [
                {"href": "https://api/self", "rel": "self"},
                {"href": "https://paypal/approve", "rel": "approve"}
            ]
        }))
        .unwrap();
        assert_eq!(created.approval_url(), Some("https://paypal/approve"));
    }
}
