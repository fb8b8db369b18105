// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription state and billing plan descriptions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingProvider {
    Stripe,
    Paypal,
}

/// Subscription tier. Selects the chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Basic,
    Premium,
}

impl Tier {
    /// Infer a tier from a plan or product name ("Premium Plan" -> Premium).
    pub fn from_plan_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.contains("premium") {
            Some(Tier::Premium)
        } else if lower.contains("basic") {
            Some(Tier::Basic)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Basic => "Basic",
            Tier::Premium => "Premium",
        }
    }
}

/// Subscription fields on the user record. Always written as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub provider: BillingProvider,
    /// Vendor status string, e.g. "active" or "ACTIVE"
    pub status: String,
    #[serde(default)]
    pub plan: Option<Tier>,
    /// Vendor subscription ID
    pub external_id: String,
}

impl Subscription {
    /// Vendor status that grants access. Stripe reports lowercase, PayPal uppercase.
    pub fn is_active(&self) -> bool {
        ["active", "trialing"]
            .iter()
            .any(|s| self.status.eq_ignore_ascii_case(s))
    }
}

/// Billing plan description loaded from the subscriptions file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionConfig {
    pub price: String,
    pub currency: String,
    pub product_name: String,
    #[serde(default)]
    pub product_description: String,
    #[serde(default = "default_product_type")]
    pub product_type: String,
    #[serde(default)]
    pub product_category: Option<String>,
    pub plan_name: String,
    #[serde(default)]
    pub plan_description: String,
    #[serde(default)]
    pub brand_name: String,
    /// PayPal interval unit: DAY, WEEK, MONTH or YEAR
    pub interval: String,
    /// Explicit tier; inferred from the plan name when absent
    #[serde(default)]
    pub tier: Option<Tier>,
}

fn default_product_type() -> String {
    "SERVICE".to_string()
}

impl SubscriptionConfig {
    pub fn tier(&self) -> Option<Tier> {
        self.tier
            .or_else(|| Tier::from_plan_name(&self.plan_name))
            .or_else(|| Tier::from_plan_name(&self.product_name))
    }
}

/// Top-level shape of the subscriptions file.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionFile {
    #[serde(default)]
    pub items: Vec<SubscriptionConfig>,
}
