// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for PayPal and Stripe subscription events.
//!
//! Both receivers authenticate the delivery before looking at the event.

use crate::error::{AppError, Result};
use crate::routes::payments::save_subscription;
use crate::routes::MessageResponse;
use crate::services::paypal::WebhookHeaders;
use crate::services::stripe::{verify_webhook_signature, StripeEvent, StripeSubscription};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/paypal-webhook", post(paypal_webhook))
        .route("/api/stripe-webhook", post(stripe_webhook))
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[derive(Deserialize)]
struct PayPalEvent {
    event_type: String,
    resource: PayPalResource,
}

#[derive(Deserialize)]
struct PayPalResource {
    id: String,
    #[serde(default)]
    plan_id: Option<String>,
}

/// Subscription status recorded for a PayPal lifecycle event.
fn paypal_status(event_type: &str) -> Option<&'static str> {
    match event_type {
        "BILLING.SUBSCRIPTION.ACTIVATED" => Some("ACTIVE"),
        "BILLING.SUBSCRIPTION.CANCELLED" => Some("CANCELLED"),
        "BILLING.SUBSCRIPTION.SUSPENDED" => Some("SUSPENDED"),
        "BILLING.SUBSCRIPTION.EXPIRED" => Some("EXPIRED"),
        _ => None,
    }
}

/// Handle a PayPal webhook (POST).
async fn paypal_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>> {
    let (Some(paypal), Some(webhook_id)) = (
        state.paypal.as_deref(),
        state.config.paypal_webhook_id.as_deref(),
    ) else {
        tracing::warn!("PayPal webhook received but PayPal is not configured");
        return Err(AppError::InvalidSignature);
    };

    let transmission = WebhookHeaders {
        auth_algo: header_value(&headers, "paypal-auth-algo"),
        cert_url: header_value(&headers, "paypal-cert-url"),
        transmission_id: header_value(&headers, "paypal-transmission-id"),
        transmission_sig: header_value(&headers, "paypal-transmission-sig"),
        transmission_time: header_value(&headers, "paypal-transmission-time"),
    };
    let raw = paypal
        .verify_webhook_signature(&transmission, webhook_id, &body)
        .await?;

    let event: PayPalEvent = serde_json::from_value(raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    let Some(status) = paypal_status(&event.event_type) else {
        tracing::debug!(event_type = %event.event_type, "Ignoring PayPal event");
        return Ok(MessageResponse::new("Event ignored"));
    };

    let Some(user) = state
        .users
        .find_by_subscription_id(&event.resource.id)
        .await?
    else {
        tracing::warn!(subscription_id = %event.resource.id, "PayPal event for unknown subscription");
        return Ok(MessageResponse::new("Event ignored"));
    };

    let Some(mut subscription) = user.subscription else {
        return Ok(MessageResponse::new("Event ignored"));
    };
    subscription.status = status.to_string();
    if let Some(tier) = event
        .resource
        .plan_id
        .as_deref()
        .and_then(|id| state.plans.tier_for_plan_id(id))
    {
        subscription.plan = Some(tier);
    }
    save_subscription(&state, &user.email, &subscription).await?;

    tracing::info!(
        email = %user.email,
        event_type = %event.event_type,
        subscription_id = %event.resource.id,
        "PayPal subscription updated from webhook"
    );
    Ok(MessageResponse::new("Webhook processed successfully"))
}

/// Handle a Stripe webhook (POST).
async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or(AppError::InvalidSignature)?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    verify_webhook_signature(&body, signature, secret, chrono::Utc::now().timestamp())?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    if event.kind != "customer.subscription.updated" && event.kind != "customer.subscription.deleted" {
        tracing::debug!(event_type = %event.kind, "Ignoring Stripe event");
        return Ok(MessageResponse::new("Event ignored"));
    }

    let object: StripeSubscription = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::BadRequest(format!("Invalid subscription object: {}", e)))?;

    let Some(user) = state.users.find_by_subscription_id(&object.id).await? else {
        tracing::warn!(subscription_id = %object.id, "Stripe event for unknown subscription");
        return Ok(MessageResponse::new("Event ignored"));
    };
    let Some(mut subscription) = user.subscription else {
        return Ok(MessageResponse::new("Event ignored"));
    };

    subscription.status = object.status;
    save_subscription(&state, &user.email, &subscription).await?;

    tracing::info!(
        email = %user.email,
        event_type = %event.kind,
        status = %subscription.status,
        "Stripe subscription updated from webhook"
    );
    Ok(MessageResponse::new("Webhook processed successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paypal_status_mapping() {
        assert_eq!(paypal_status("BILLING.SUBSCRIPTION.CANCELLED"), Some("CANCELLED"));
        assert_eq!(paypal_status("BILLING.SUBSCRIPTION.EXPIRED"), Some("EXPIRED"));
        assert_eq!(paypal_status("PAYMENT.SALE.COMPLETED"), None);
    }
}
