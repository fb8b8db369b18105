// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session and OAuth nonce cookies.

use crate::middleware::auth::{SESSION_COOKIE, SESSION_TTL_DAYS};
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

pub const NONCE_COOKIE: &str = "oauth_nonce";
const NONCE_PATH: &str = "/auth";

/// Session cookie carrying the JWT. `secure` is off only for localhost.
pub fn session_cookie(token: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::days(SESSION_TTL_DAYS))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Nonce binding an OAuth `state` to this browser, scoped to `/auth`.
pub fn nonce_cookie(nonce: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((NONCE_COOKIE, nonce.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(NONCE_PATH)
        .max_age(Duration::minutes(15))
        .build()
}

pub fn clear_nonce_cookie() -> Cookie<'static> {
    Cookie::build((NONCE_COOKIE, ""))
        .path(NONCE_PATH)
        .max_age(Duration::ZERO)
        .build()
}
