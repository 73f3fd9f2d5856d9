//! Federated sign-in handlers.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use super::with_session_cookies;
use crate::dtos::auth::{GitHubAuthRequest, GoogleAuthRequest, InitAckResponse};
use crate::models::OAuthProvider;
use crate::services::SignInResult;
use crate::utils::ValidatedJson;
use crate::AppState;

fn signed_in(state: &AppState, jar: CookieJar, result: SignInResult) -> Response {
    let jar = with_session_cookies(
        jar,
        &result.access_token,
        &result.refresh_token,
        state.config.security.secure_cookies,
    );
    (jar, Json(result)).into_response()
}

/// GitHub authorization-code flow.
///
/// POST /auth/github
#[tracing::instrument(skip_all)]
pub async fn github_signin(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<GitHubAuthRequest>,
) -> Result<Response, AppError> {
    match req {
        GitHubAuthRequest::Init { state: oauth_state } => {
            state
                .signin
                .init(OAuthProvider::GitHub, &oauth_state)
                .await?;
            Ok(Json(InitAckResponse {
                ok: "github oauth init ack",
            })
            .into_response())
        }
        GitHubAuthRequest::Code {
            state: oauth_state,
            code,
        } => {
            let result = state
                .signin
                .complete_with_code(OAuthProvider::GitHub, &oauth_state, &code)
                .await?;
            Ok(signed_in(&state, jar, result))
        }
    }
}

/// Google identity-token flow.
///
/// POST /auth/google
#[tracing::instrument(skip_all)]
pub async fn google_signin(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<GoogleAuthRequest>,
) -> Result<Response, AppError> {
    let result = state
        .signin
        .complete_with_identity_token(
            &req.credential,
            req.state.as_deref(),
            req.nonce.as_deref(),
        )
        .await?;

    Ok(signed_in(&state, jar, result))
}
