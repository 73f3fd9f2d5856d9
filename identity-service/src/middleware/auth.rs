use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::{cookie_or_bearer, ACCESS_TOKEN_COOKIE};
use crate::{
    services::{TokenError, TokenKind},
    AppState,
};

/// Identity carried by a valid access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Middleware to require a valid access token (cookie first, then bearer).
///
/// Expiry is reported separately so clients know to refresh.
pub async fn access_token_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = cookie_or_bearer(req.headers(), ACCESS_TOKEN_COOKIE).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("invalid or malformed access token"))
    })?;

    let claims = state
        .sessions
        .jwt()
        .verify(TokenKind::Access, &token)
        .map_err(|e| match e {
            TokenError::Expired => {
                AppError::Unauthorized(anyhow::anyhow!("access token has expired"))
            }
            _ => AppError::Unauthorized(anyhow::anyhow!("invalid or malformed access token")),
        })?;

    req.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        session_id: claims.jti,
    });

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().copied().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })
    }
}
