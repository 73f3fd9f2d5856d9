//! Request guards.
//!
//! Each guard reads one credential, validates it and stores the resulting
//! identity in the request extensions, where the matching extractor picks
//! it up.

pub mod api_key;
pub mod auth;
pub mod refresh;

pub use api_key::{api_key_middleware, CurrentApp};
pub use auth::{access_token_middleware, AuthUser};
pub use refresh::{refresh_token_middleware, RefreshSession};

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Value of an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Token from the named cookie, falling back to the bearer header.
pub fn cookie_or_bearer(headers: &HeaderMap, cookie: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(cookie)
        .map(|c| c.value().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers).map(str::to_string))
}
