// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar Assistant: AI scheduling help on top of the user's own calendar
//!
//! This crate provides the backend API: password and Google/Microsoft
//! sign-in, Stripe/PayPal subscriptions, a calendar proxy over Google
//! Calendar and Microsoft Graph, a Gmail reader, and Gemini-backed chat.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::UserStore;
use error::AppError;
use models::AuthProvider;
use services::{
    CalendarFactory, KmsService, OAuthProvider, PayPalClient, PlanCatalog, SessionCache,
    StripeClient,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub kms: KmsService,
    pub http: reqwest::Client,
    pub google_oauth: Arc<OAuthProvider>,
    pub microsoft_oauth: Option<Arc<OAuthProvider>>,
    pub calendars: Arc<dyn CalendarFactory>,
    pub sessions: Arc<SessionCache>,
    pub stripe: Option<StripeClient>,
    pub paypal: Option<Arc<PayPalClient>>,
    pub plans: PlanCatalog,
}

impl AppState {
    /// OAuth client for a provider; Microsoft may be unconfigured.
    pub fn oauth_provider(&self, provider: AuthProvider) -> Result<Arc<OAuthProvider>, AppError> {
        match provider {
            AuthProvider::Google => Ok(self.google_oauth.clone()),
            AuthProvider::Microsoft => self
                .microsoft_oauth
                .clone()
                .ok_or_else(|| AppError::NotFound("Microsoft sign-in is not configured".to_string())),
        }
    }
}
