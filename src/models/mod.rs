// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod email;
pub mod event;
pub mod subscription;
pub mod token;
pub mod user;

pub use email::Email;
pub use event::CalendarEvent;
pub use subscription::{BillingProvider, Subscription, SubscriptionConfig, Tier};
pub use token::OAuthToken;
pub use user::{AuthProvider, User};
