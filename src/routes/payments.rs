// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription routes (Stripe checkout, PayPal lifecycle, status).

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthSession;
use crate::models::{BillingProvider, Subscription, Tier, User};
use crate::routes::{AppJson, MessageResponse};
use crate::services::{PayPalClient, StripeClient};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_CANCEL_REASON: &str = "Cancelled by customer";
const DEFAULT_SUSPEND_REASON: &str = "Suspended by customer";
const ACTIVATE_REASON: &str = "Reactivated by customer";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/payment", post(stripe_payment))
        .route("/api/paypal", post(paypal_subscribe))
        .route("/api/paypal-check", get(paypal_return))
        .route("/api/paypal-cancel", post(paypal_cancel))
        .route("/api/paypal-activate", post(paypal_activate))
        .route("/api/paypal-suspend", post(paypal_suspend))
        .route("/api/subscription-status", get(subscription_status))
}

fn stripe(state: &AppState) -> Result<&StripeClient> {
    state
        .stripe
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Stripe billing is not configured".to_string()))
}

fn paypal(state: &AppState) -> Result<&PayPalClient> {
    state
        .paypal
        .as_deref()
        .ok_or_else(|| AppError::NotFound("PayPal billing is not configured".to_string()))
}

async fn load_user(state: &AppState, email: &str) -> Result<User> {
    state
        .users
        .get_user(email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", email)))
}

// ─── Stripe ──────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct PaymentRequest {
    /// Card token from Stripe.js
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub status: String,
}

/// Subscribe the user to the configured Stripe price.
async fn stripe_payment(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    AppJson(body): AppJson<PaymentRequest>,
) -> Result<Json<PaymentResponse>> {
    let stripe = stripe(&state)?;
    let price_id = state
        .config
        .stripe_price_id
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Stripe price is not configured".to_string()))?;

    let customer = stripe
        .create_customer(&session.email, body.token.as_deref())
        .await?;
    let created = stripe.create_subscription(&customer.id, price_id).await?;

    save_subscription(
        &state,
        &session.email,
        &Subscription {
            provider: BillingProvider::Stripe,
            status: created.status.clone(),
            plan: Some(Tier::Premium),
            external_id: created.id.clone(),
        },
    )
    .await?;

    tracing::info!(
        email = %session.email,
        subscription_id = %created.id,
        status = %created.status,
        "Stripe subscription created"
    );

    Ok(Json(PaymentResponse {
        status: created.status,
    }))
}

// ─── PayPal ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalSubscribeRequest {
    pub product_name: String,
}

#[derive(Serialize)]
pub struct PayPalSubscribeResponse {
    pub subscription_id: String,
    pub approval_url: String,
}

/// Create a PayPal subscription for a catalog plan and hand back the approval URL.
async fn paypal_subscribe(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    AppJson(body): AppJson<PayPalSubscribeRequest>,
) -> Result<Json<PayPalSubscribeResponse>> {
    let paypal = paypal(&state)?;
    let entry = state
        .plans
        .find(&body.product_name)
        .ok_or_else(|| AppError::NotFound(format!("Product {}", body.product_name)))?;
    let plan_id = entry.plan_id.as_deref().ok_or_else(|| {
        AppError::Upstream(format!("PayPal plan for {} is not provisioned", body.product_name))
    })?;

    let base = state.config.base_url.trim_end_matches('/');
    let created = paypal
        .create_subscription(
            plan_id,
            &entry.config.brand_name,
            &format!("{}/api/paypal-check", base),
            &format!("{}/payment", base),
            &session.email,
        )
        .await?;

    let approval_url = created
        .approval_url()
        .ok_or_else(|| AppError::Upstream("PayPal returned no approval link".to_string()))?
        .to_string();

    tracing::info!(email = %session.email, subscription_id = %created.id, "PayPal subscription pending approval");

    Ok(Json(PayPalSubscribeResponse {
        subscription_id: created.id,
        approval_url,
    }))
}

#[derive(Deserialize)]
pub struct ReturnParams {
    #[serde(default)]
    subscription_id: Option<String>,
}

/// PayPal approval return URL: record the subscription once it is active.
async fn paypal_return(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    Query(params): Query<ReturnParams>,
) -> Result<Redirect> {
    let subscription_id = params
        .subscription_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("subscription_id is required".to_string()))?;

    let details = paypal(&state)?
        .subscription_details(&subscription_id)
        .await?;

    if details.status != "ACTIVE" {
        return Err(AppError::BadRequest("Subscription not active".to_string()));
    }
    if let Some(owner) = details.custom_id.as_deref() {
        if !owner.eq_ignore_ascii_case(&session.email) {
            tracing::warn!(email = %session.email, subscription_id = %subscription_id, "PayPal subscription belongs to another account");
            return Err(AppError::BadRequest(
                "Subscription belongs to another account".to_string(),
            ));
        }
    }

    let plan = details
        .plan_id
        .as_deref()
        .and_then(|id| state.plans.tier_for_plan_id(id));

    save_subscription(
        &state,
        &session.email,
        &Subscription {
            provider: BillingProvider::Paypal,
            status: details.status,
            plan,
            external_id: subscription_id.clone(),
        },
    )
    .await?;

    tracing::info!(email = %session.email, subscription_id = %subscription_id, "PayPal subscription activated");
    Ok(Redirect::to("/chat"))
}

#[derive(Deserialize, Default)]
struct ReasonRequest {
    #[serde(default)]
    reason: Option<String>,
}

/// Optional `{reason}` body; an empty body is allowed.
fn parse_reason(body: &Bytes) -> Result<Option<String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let parsed: ReasonRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;
    Ok(parsed.reason.filter(|r| !r.trim().is_empty()))
}

/// The user's PayPal subscription, or `NotFound`.
async fn paypal_subscription(state: &AppState, email: &str) -> Result<Subscription> {
    load_user(state, email)
        .await?
        .subscription
        .filter(|s| s.provider == BillingProvider::Paypal)
        .ok_or_else(|| AppError::NotFound("PayPal subscription".to_string()))
}

/// Write the subscription and drop the user's cached chats, which were
/// started under the previous status.
pub(super) async fn save_subscription(
    state: &AppState,
    email: &str,
    subscription: &Subscription,
) -> Result<()> {
    state.users.update_subscription(email, subscription).await?;
    let evicted = state.sessions.evict_chats_for(email);
    if evicted > 0 {
        tracing::debug!(email = %email, evicted, "Cached chats dropped after subscription change");
    }
    Ok(())
}

async fn record_status(
    state: &AppState,
    email: &str,
    mut subscription: Subscription,
    status: &str,
) -> Result<()> {
    subscription.status = status.to_string();
    save_subscription(state, email, &subscription).await
}

async fn paypal_cancel(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    body: Bytes,
) -> Result<Json<MessageResponse>> {
    let reason = parse_reason(&body)?.unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
    let subscription = paypal_subscription(&state, &session.email).await?;

    paypal(&state)?
        .cancel_subscription(&subscription.external_id, &reason)
        .await?;
    record_status(&state, &session.email, subscription, "CANCELLED").await?;

    Ok(MessageResponse::new("Subscription cancelled successfully"))
}

async fn paypal_activate(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<MessageResponse>> {
    let subscription = paypal_subscription(&state, &session.email).await?;

    paypal(&state)?
        .activate_subscription(&subscription.external_id, ACTIVATE_REASON)
        .await?;
    record_status(&state, &session.email, subscription, "ACTIVE").await?;

    Ok(MessageResponse::new("Subscription activated successfully"))
}

async fn paypal_suspend(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
    body: Bytes,
) -> Result<Json<MessageResponse>> {
    let reason = parse_reason(&body)?.unwrap_or_else(|| DEFAULT_SUSPEND_REASON.to_string());
    let subscription = paypal_subscription(&state, &session.email).await?;

    paypal(&state)?
        .suspend_subscription(&subscription.external_id, &reason)
        .await?;
    record_status(&state, &session.email, subscription, "SUSPENDED").await?;

    Ok(MessageResponse::new("Subscription suspended successfully"))
}

// ─── Status ──────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub provider: String,
    pub plan: Option<String>,
    pub status: String,
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_billing_date: Option<String>,
    /// Last payment, e.g. "9.99 EUR"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

async fn subscription_status(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<SubscriptionStatusResponse>> {
    let subscription = load_user(&state, &session.email)
        .await?
        .subscription
        .ok_or_else(|| AppError::NotFound("Subscription".to_string()))?;

    let mut response = SubscriptionStatusResponse {
        provider: match subscription.provider {
            BillingProvider::Stripe => "stripe",
            BillingProvider::Paypal => "paypal",
        }
        .to_string(),
        plan: subscription.plan.map(|t| t.as_str().to_string()),
        status: subscription.status.clone(),
        subscription_id: subscription.external_id.clone(),
        next_billing_date: None,
        amount: None,
    };

    if let (BillingProvider::Paypal, Some(paypal)) = (subscription.provider, state.paypal.as_deref()) {
        let details = paypal
            .subscription_details(&subscription.external_id)
            .await?;
        response.status = details.status;
        if let Some(billing) = details.billing_info {
            response.next_billing_date = billing.next_billing_time;
            response.amount = billing
                .last_payment
                .map(|p| format!("{} {}", p.amount.value, p.amount.currency_code));
        }
    }

    Ok(Json(response))
}
