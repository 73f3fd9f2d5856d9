//! Google identity token verification against Google's JWKS.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use service_core::observability::inject_trace_context;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{IdentityClaims, IdentityTokenVerifier, ProviderError};
use crate::config::GoogleOAuthConfig;

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Google rotates keys daily; ten minutes keeps fetches rare.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

/// An unknown `kid` refetches the set only if the cached copy is older
/// than this.
const JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
    nonce: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct GoogleIdTokenVerifier {
    http: reqwest::Client,
    jwks_uri: String,
    cache: Arc<RwLock<Option<CachedJwks>>>,
}

impl GoogleIdTokenVerifier {
    pub fn new(config: &GoogleOAuthConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            jwks_uri: config.jwks_uri.clone(),
            cache: Arc::new(RwLock::new(None)),
        })
    }

    async fn cached(&self, max_age: Duration) -> Option<JwkSet> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < max_age)
            .map(|cached| cached.jwks.clone())
    }

    /// The key set, fetched again when the cached copy is older than `max_age`.
    async fn jwks(&self, max_age: Duration) -> Result<JwkSet, ProviderError> {
        if let Some(jwks) = self.cached(max_age).await {
            return Ok(jwks);
        }

        tracing::info!(jwks_uri = %self.jwks_uri, "Fetching JWKS");

        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let response = self
            .http
            .get(&self.jwks_uri)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(jwks_uri = %self.jwks_uri, status = %status, "JWKS endpoint returned error status");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let jwks: JwkSet = response.json().await?;
        tracing::debug!(key_count = jwks.keys.len(), "JWKS refreshed");

        *self.cache.write().await = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });

        Ok(jwks)
    }

    /// Key for `kid`. A miss refetches the set to pick up rotation, at most
    /// once per [`JWKS_MIN_REFRESH_INTERVAL`].
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, ProviderError> {
        let jwks = self.jwks(JWKS_CACHE_TTL).await?;
        let jwk = match jwks.find(kid) {
            Some(jwk) => jwk.clone(),
            None => self
                .jwks(JWKS_MIN_REFRESH_INTERVAL)
                .await?
                .find(kid)
                .cloned()
                .ok_or_else(|| ProviderError::Rejected(format!("unknown signing key {}", kid)))?,
        };

        DecodingKey::from_jwk(&jwk).map_err(|e| ProviderError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl IdentityTokenVerifier for GoogleIdTokenVerifier {
    #[tracing::instrument(skip_all)]
    async fn verify_signed_identity(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<IdentityClaims, ProviderError> {
        let header = decode_header(token).map_err(|e| ProviderError::Rejected(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| ProviderError::Rejected("missing kid".to_string()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<GoogleClaims>(token, &key, &validation)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?
            .claims;

        if claims.email_verified == Some(false) {
            return Err(ProviderError::Rejected("email not verified".to_string()));
        }

        let email = claims
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::Rejected("missing email claim".to_string()))?;

        Ok(IdentityClaims {
            sub: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
            nonce: claims.nonce,
        })
    }
}
