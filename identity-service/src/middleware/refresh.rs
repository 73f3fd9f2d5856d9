use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::{cookie_or_bearer, REFRESH_TOKEN_COOKIE};
use crate::{
    services::{TokenError, TokenKind},
    AppState,
};

/// Session named by a valid refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSession {
    pub jti: Uuid,
    pub user_id: Uuid,
}

/// Middleware to require a valid refresh token (cookie first, then bearer).
///
/// Only signature and expiry are checked here. Whether the session still
/// exists is decided by rotation or sign-out.
pub async fn refresh_token_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = cookie_or_bearer(req.headers(), REFRESH_TOKEN_COOKIE).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("invalid or malformed refresh token"))
    })?;

    let claims = state
        .sessions
        .jwt()
        .verify(TokenKind::Refresh, &token)
        .map_err(|e| match e {
            TokenError::Expired => {
                AppError::Unauthorized(anyhow::anyhow!("refresh token has expired"))
            }
            _ => AppError::Unauthorized(anyhow::anyhow!("invalid or malformed refresh token")),
        })?;

    req.extensions_mut().insert(RefreshSession {
        jti: claims.jti,
        user_id: claims.sub,
    });

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for RefreshSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RefreshSession>().copied().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Refresh session missing from request extensions"
            ))
        })
    }
}
