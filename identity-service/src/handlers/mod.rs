//! HTTP handlers for identity-service.

pub mod health;
pub mod oauth;
pub mod sdk;
pub mod session;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::middleware::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};

fn token_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Set both session cookies on `jar`.
pub(crate) fn with_session_cookies(
    jar: CookieJar,
    access_token: &str,
    refresh_token: &str,
    secure: bool,
) -> CookieJar {
    jar.add(token_cookie(ACCESS_TOKEN_COOKIE, access_token.to_string(), secure))
        .add(token_cookie(REFRESH_TOKEN_COOKIE, refresh_token.to_string(), secure))
}

/// Expire both session cookies.
pub(crate) fn without_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"))
}
