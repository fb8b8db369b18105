// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A mail message rendered for the frontend.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    /// Always "html"
    #[serde(rename = "type")]
    pub kind: String,
    /// `"<subject> From: <sender>"`
    pub subject: String,
    pub body: String,
    pub send_at: String,
}
