use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Claims carried by both access and refresh tokens.
///
/// `jti` is the session id. Unknown fields are rejected on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Session ID
    pub jti: Uuid,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(err.to_string()),
        }
    }
}

/// A signed token together with its expiry.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// HS256 signer for session tokens.
///
/// Access and refresh tokens are signed with different secrets, so one can
/// never be presented as the other.
#[derive(Clone)]
pub struct JwtService {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        tracing::info!("JWT service initialized with HS256 secrets");

        Self {
            access: KeyPair::from_secret(&config.access_token_secret),
            refresh: KeyPair::from_secret(&config.refresh_token_secret),
            access_ttl: Duration::minutes(config.access_token_expiry_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expiry_days),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a token of `kind` for `user_id` and session `jti`, issued at `now`.
    pub fn sign(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        jti: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, TokenError> {
        let expires_at = now + self.ttl(kind);
        let claims = TokenClaims {
            sub: user_id,
            jti,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        self.encode_claims(kind, &claims)
            .map(|token| SignedToken { token, expires_at })
    }

    pub fn encode_claims(&self, kind: TokenKind, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate signature and expiry, returning the typed claims.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<TokenClaims>(token, &self.keys(kind).decoding, &validation)?;
        Ok(data.claims)
    }
}
