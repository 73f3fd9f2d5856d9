use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::bearer_token;
use crate::{services::AuthError, AppState};

/// App bound to the API key of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentApp {
    pub app_id: Uuid,
}

/// Middleware to require a valid API key.
///
/// Malformed, unknown and revoked keys get the same response.
pub async fn api_key_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("invalid api key")))?;

    let app_id = match state.api_keys.resolve(key).await {
        Ok(app_id) => app_id,
        Err(AuthError::MalformedKey | AuthError::NotFound) => {
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid api key")));
        }
        Err(e) => {
            tracing::error!(error = %e, "API key lookup failed");
            return Err(e.into());
        }
    };

    req.extensions_mut().insert(CurrentApp { app_id });
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentApp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentApp>().copied().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "CurrentApp missing from request extensions"
            ))
        })
    }
}
