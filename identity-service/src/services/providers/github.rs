//! GitHub OAuth app client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use serde::Deserialize;
use serde_json::Value;
use service_core::observability::inject_trace_context;
use std::time::Duration;

use super::{CodeExchangeProvider, ProviderError, ProviderProfile};
use crate::config::GitHubOAuthConfig;

const USER_AGENT: &str = concat!("identity-service/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailEntry {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubOAuthConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, reqwest::header::HeaderValue::from_static("application/json"));
        inject_trace_context(&mut headers);
        headers
    }

    async fn get_json(&self, path: &str, access_token: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .headers(Self::headers())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Primary verified address, for accounts with a private profile email.
    async fn primary_email(&self, access_token: &str) -> Result<String, ProviderError> {
        let emails: Vec<EmailEntry> =
            serde_json::from_value(self.get_json("/user/emails", access_token).await?)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .ok_or_else(|| ProviderError::InvalidResponse("no verified primary email".to_string()))
    }
}

#[async_trait]
impl CodeExchangeProvider for GitHubClient {
    #[tracing::instrument(skip_all)]
    async fn exchange_authorization_code(&self, code: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.token_url)
            .headers(Self::headers())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "GitHub token exchange error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // GitHub reports bad codes with a 200 and an `error` field.
        let token: TokenResponse = response.json().await?;
        match (token.access_token, token.error) {
            (Some(access_token), None) if !access_token.is_empty() => Ok(access_token),
            (_, error) => Err(ProviderError::InvalidResponse(format!(
                "{}: {}",
                error.unwrap_or_else(|| "missing_access_token".to_string()),
                token.error_description.unwrap_or_default()
            ))),
        }
    }

    #[tracing::instrument(skip_all)]
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let mut raw = self.get_json("/user", access_token).await?;

        let id = match raw.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => return Err(ProviderError::InvalidResponse("missing user id".to_string())),
        };

        let login = raw.get("login").and_then(Value::as_str).unwrap_or_default();
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(login)
            .to_string();

        let email = match raw.get("email").and_then(Value::as_str) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => {
                let email = self.primary_email(access_token).await?;
                if let Some(object) = raw.as_object_mut() {
                    object.insert("email".to_string(), Value::String(email.clone()));
                }
                email
            }
        };

        Ok(ProviderProfile {
            id,
            name,
            email,
            raw,
        })
    }
}
