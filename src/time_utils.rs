// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Human-readable form of an RFC 3339 timestamp, e.g. "Tue, Jan 2 at 9:00 AM".
///
/// The timestamp's own offset is kept. Unparseable input is returned as is.
pub fn format_human(value: &str) -> String {
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => t.format("%a, %b %-d at %-I:%M %p").to_string(),
        Err(_) => value.to_string(),
    }
}

/// Date as `DD.MM.YYYY`.
pub fn format_day(date: DateTime<Utc>) -> String {
    date.format("%d.%m.%Y").to_string()
}
