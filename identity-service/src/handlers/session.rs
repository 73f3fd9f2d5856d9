//! Session refresh, sign-out and introspection.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use super::{with_session_cookies, without_session_cookies};
use crate::dtos::auth::{RefreshResponse, SessionResponse, SessionUser, SignoutResponse};
use crate::middleware::{AuthUser, RefreshSession};
use crate::services::AuthError;
use crate::AppState;

/// Exchange a refresh token for a new pair. Each refresh token works once.
///
/// POST /auth/refresh
#[tracing::instrument(skip_all, fields(jti = %session.jti))]
pub async fn refresh(
    State(state): State<AppState>,
    session: RefreshSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RefreshResponse>), AppError> {
    let rotated = state.sessions.rotate(session.jti).await.map_err(|e| match e {
        AuthError::SessionNotFound => AppError::Unauthorized(anyhow::anyhow!(
            "could not verify authenticity of the refresh token"
        )),
        other => other.into(),
    })?;

    state.sessions.spawn_cleanup();

    let jar = with_session_cookies(
        jar,
        &rotated.access_token,
        &rotated.refresh_token,
        state.config.security.secure_cookies,
    );

    Ok((
        jar,
        Json(RefreshResponse {
            access_token: rotated.access_token,
            refresh_token: rotated.refresh_token,
            session_id: rotated.jti,
        }),
    ))
}

/// Drop the session behind the refresh token.
///
/// DELETE /auth/signout
#[tracing::instrument(skip_all, fields(jti = %session.jti))]
pub async fn signout(
    State(state): State<AppState>,
    session: RefreshSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SignoutResponse>), AppError> {
    state.sessions.revoke(session.jti).await?;
    Ok((without_session_cookies(jar), Json(SignoutResponse { ok: true })))
}

/// Current user, own team and avatar.
///
/// GET /auth/session
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id))]
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state
        .store
        .find_user_by_id(auth.user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("not authenticated")))?;

    let team = state
        .store
        .find_own_team(user.id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::OwnTeamMissing(user.id))?;

    let session = state
        .sessions
        .find(auth.session_id)
        .await
        .map_err(|e| match e {
            AuthError::SessionNotFound => {
                AppError::Unauthorized(anyhow::anyhow!("could not fetch session"))
            }
            other => other.into(),
        })?;

    Ok(Json(SessionResponse {
        user: SessionUser {
            id: user.id,
            own_team_id: team.id,
            avatar_url: session.avatar_url().map(str::to_string),
            name: user.name,
            email: user.email,
            last_sign_in_at: user.last_sign_in_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        },
    }))
}
