// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Billing plan catalog.
//!
//! Plans are read once from the subscriptions file. When PayPal is
//! configured, each plan gets a PayPal product and billing plan at startup;
//! after that the catalog is read-only.

use crate::error::AppError;
use crate::models::subscription::SubscriptionFile;
use crate::models::{SubscriptionConfig, Tier};
use crate::services::paypal::PayPalClient;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub config: SubscriptionConfig,
    /// PayPal billing plan ID, once provisioned
    pub plan_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    entries: Vec<PlanEntry>,
}

impl PlanCatalog {
    pub fn from_configs(configs: Vec<SubscriptionConfig>) -> Self {
        Self {
            entries: configs
                .into_iter()
                .map(|config| PlanEntry {
                    config,
                    plan_id: None,
                })
                .collect(),
        }
    }

    /// Catalog with already-provisioned PayPal plan IDs.
    pub fn from_entries(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    /// Read the subscriptions file. A missing file yields an empty catalog.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Subscriptions file not found, no plans loaded");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let file: SubscriptionFile = serde_json::from_str(&raw).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Invalid subscriptions file {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), plans = file.items.len(), "Subscription plans loaded");
        Ok(Self::from_configs(file.items))
    }

    /// Create a PayPal product and billing plan for every unprovisioned entry.
    ///
    /// A plan that fails to provision is logged and left without a plan ID.
    pub async fn provision(&mut self, paypal: &PayPalClient) {
        for entry in self.entries.iter_mut().filter(|e| e.plan_id.is_none()) {
            let name = entry.config.product_name.clone();
            let result = async {
                let product_id = paypal.create_product(&entry.config).await?;
                paypal.create_plan(&product_id, &entry.config).await
            }
            .await;

            match result {
                Ok(plan_id) => {
                    tracing::info!(product = %name, plan_id = %plan_id, "PayPal plan provisioned");
                    entry.plan_id = Some(plan_id);
                }
                Err(e) => {
                    tracing::error!(product = %name, error = %e, "Failed to provision PayPal plan");
                }
            }
        }
    }

    /// Look up a plan by product or plan name.
    pub fn find(&self, name: &str) -> Option<&PlanEntry> {
        self.entries
            .iter()
            .find(|e| e.config.product_name == name || e.config.plan_name == name)
    }

    /// Tier for a PayPal plan ID.
    pub fn tier_for_plan_id(&self, plan_id: &str) -> Option<Tier> {
        self.entries
            .iter()
            .find(|e| e.plan_id.as_deref() == Some(plan_id))
            .and_then(|e| e.config.tier())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
