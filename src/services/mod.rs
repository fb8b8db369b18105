// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod billing;
pub mod calendar;
pub mod chat;
pub mod gemini;
pub mod gmail;
pub mod http;
pub mod kms;
pub mod oauth;
pub mod password;
pub mod paypal;
pub mod session_cache;
pub mod stripe;

pub use billing::PlanCatalog;
pub use calendar::{Calendar, CalendarFactory, ProviderCalendarFactory};
pub use gemini::{GeminiClient, LlmClient};
pub use gmail::GmailClient;
pub use kms::KmsService;
pub use oauth::{OAuthProvider, TokenSource};
pub use paypal::PayPalClient;
pub use session_cache::SessionCache;
pub use stripe::StripeClient;
