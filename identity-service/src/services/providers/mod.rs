//! Federated identity providers.
//!
//! Two contracts: [`CodeExchangeProvider`] for authorization-code flows and
//! [`IdentityTokenVerifier`] for provider-signed identity tokens.

mod github;
mod google;
mod mock;

pub use github::GitHubClient;
pub use google::GoogleIdTokenVerifier;
pub use mock::{MockCodeExchange, MockIdentityVerifier};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("identity token rejected: {0}")]
    Rejected(String),
}

/// Profile returned by a code-exchange provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Full provider payload, stored with the session.
    pub raw: Value,
}

/// Claims of a verified identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub nonce: Option<String>,
}

impl IdentityClaims {
    /// Profile stored with the session. The nonce is left out.
    pub fn profile(&self) -> Value {
        serde_json::json!({
            "id": self.sub,
            "email": self.email,
            "name": self.name,
            "picture": self.picture,
        })
    }
}

#[async_trait]
pub trait CodeExchangeProvider: Send + Sync {
    /// Trade an authorization code for a provider access token.
    async fn exchange_authorization_code(&self, code: &str) -> Result<String, ProviderError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError>;
}

#[async_trait]
pub trait IdentityTokenVerifier: Send + Sync {
    /// Check signature, issuer, audience and expiry of `token`.
    async fn verify_signed_identity(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<IdentityClaims, ProviderError>;
}
