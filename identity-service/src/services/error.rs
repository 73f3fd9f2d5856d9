use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use super::store::StoreError;

/// Failures of the authentication and session lifecycle.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("malformed api key")]
    MalformedKey,

    #[error("credential not found")]
    NotFound,

    #[error("auth state already exists")]
    DuplicateState,

    #[error("unknown auth state")]
    UnknownState,

    #[error("failed to exchange authorization code: {0}")]
    ProviderExchangeFailed(String),

    #[error("failed to fetch provider profile: {0}")]
    ProviderProfileFailed(String),

    #[error("invalid identity token: {0}")]
    InvalidIdentityToken(String),

    #[error("nonce does not match identity token")]
    NonceMismatch,

    #[error("`{0}` must be sent together with its pair")]
    MissingPairedParameter(&'static str),

    #[error("session not found")]
    SessionNotFound,

    #[error("failed to sign token: {0}")]
    SigningError(String),

    #[error("persistence failure: {0}")]
    PersistError(#[from] StoreError),

    #[error("random source unavailable: {0}")]
    RandomSourceError(String),

    #[error("user {0} has no own team")]
    OwnTeamMissing(Uuid),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            // Malformed and unknown keys look the same from outside.
            AuthError::MalformedKey | AuthError::NotFound => {
                AppError::Unauthorized(anyhow::anyhow!("invalid api key"))
            }
            AuthError::UnknownState | AuthError::SessionNotFound | AuthError::NonceMismatch => {
                AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
            }
            AuthError::InvalidIdentityToken(_) => {
                AppError::Unauthorized(anyhow::anyhow!("invalid identity token"))
            }
            AuthError::DuplicateState => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            AuthError::MissingPairedParameter(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            AuthError::ProviderExchangeFailed(_) | AuthError::ProviderProfileFailed(_) => {
                AppError::BadGateway(err.to_string())
            }
            AuthError::PersistError(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            AuthError::SigningError(_)
            | AuthError::RandomSourceError(_)
            | AuthError::OwnTeamMissing(_) => AppError::InternalError(anyhow::anyhow!(err)),
        }
    }
}
