use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Upper bound on caller supplied `state`, `nonce` and `code` values.
const MAX_PARAM_LEN: u64 = 512;

/// Body of `POST /auth/github`, discriminated by `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GitHubAuthRequest {
    Init { state: String },
    Code { state: String, code: String },
}

impl GitHubAuthRequest {
    pub fn state(&self) -> &str {
        match self {
            GitHubAuthRequest::Init { state } | GitHubAuthRequest::Code { state, .. } => state,
        }
    }
}

fn check_param(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
) {
    if value.is_empty() {
        let mut error = ValidationError::new("required");
        error.message = Some(format!("{} is required", field).into());
        errors.add(field, error);
    } else if value.len() as u64 > MAX_PARAM_LEN {
        let mut error = ValidationError::new("length");
        error.message = Some(format!("{} is too long", field).into());
        errors.add(field, error);
    }
}

impl Validate for GitHubAuthRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_param(&mut errors, "state", self.state());
        if let GitHubAuthRequest::Code { code, .. } = self {
            check_param(&mut errors, "code", code);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Body of `POST /auth/google`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GoogleAuthRequest {
    #[validate(length(max = 8192, message = "credential is too long"))]
    #[serde(default)]
    pub credential: String,

    #[validate(length(max = 512, message = "state is too long"))]
    #[serde(default)]
    pub state: Option<String>,

    #[validate(length(max = 512, message = "nonce is too long"))]
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitAckResponse {
    pub ok: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SignoutResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub own_team_id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub last_sign_in_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
pub struct SdkAppResponse {
    pub app_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_request_is_tagged() {
        let init: GitHubAuthRequest =
            serde_json::from_str(r#"{"type":"init","state":"s1"}"#).unwrap();
        assert_eq!(init, GitHubAuthRequest::Init { state: "s1".into() });

        let code: GitHubAuthRequest =
            serde_json::from_str(r#"{"type":"code","state":"s1","code":"c1"}"#).unwrap();
        assert_eq!(
            code,
            GitHubAuthRequest::Code {
                state: "s1".into(),
                code: "c1".into()
            }
        );

        assert!(serde_json::from_str::<GitHubAuthRequest>(r#"{"type":"other","state":"s1"}"#).is_err());
        assert!(serde_json::from_str::<GitHubAuthRequest>(r#"{"type":"code","state":"s1"}"#).is_err());
    }

    #[test]
    fn test_github_request_validation() {
        assert!(GitHubAuthRequest::Init { state: "s1".into() }.validate().is_ok());
        assert!(GitHubAuthRequest::Init { state: "".into() }.validate().is_err());
        assert!(GitHubAuthRequest::Code {
            state: "s1".into(),
            code: "".into()
        }
        .validate()
        .is_err());
        assert!(GitHubAuthRequest::Init {
            state: "x".repeat(513)
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_google_request_defaults() {
        let req: GoogleAuthRequest = serde_json::from_str(r#"{"credential":"tok"}"#).unwrap();
        assert_eq!(req.credential, "tok");
        assert!(req.state.is_none());
        assert!(req.nonce.is_none());
        assert!(req.validate().is_ok());
    }
}
