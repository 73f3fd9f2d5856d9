//! In-process providers for tests and local development.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    CodeExchangeProvider, IdentityClaims, IdentityTokenVerifier, ProviderError, ProviderProfile,
};

/// Code exchange that hands out a fixed profile.
#[derive(Debug, Default)]
pub struct MockCodeExchange {
    profile: Option<ProviderProfile>,
    fail_exchange: bool,
    exchanges: AtomicUsize,
}

impl MockCodeExchange {
    pub fn with_profile(profile: ProviderProfile) -> Self {
        Self {
            profile: Some(profile),
            ..Self::default()
        }
    }

    /// Every code exchange is refused.
    pub fn rejecting_codes() -> Self {
        Self {
            fail_exchange: true,
            ..Self::default()
        }
    }

    /// Codes exchange fine but the profile endpoint fails.
    pub fn without_profile() -> Self {
        Self::default()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExchangeProvider for MockCodeExchange {
    async fn exchange_authorization_code(&self, code: &str) -> Result<String, ProviderError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange {
            return Err(ProviderError::InvalidResponse(
                "bad_verification_code".to_string(),
            ));
        }
        Ok(format!("mock-token-{}", code))
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, ProviderError> {
        self.profile.clone().ok_or(ProviderError::Status {
            status: 500,
            body: "profile unavailable".to_string(),
        })
    }
}

/// Verifier that accepts one token for one audience.
#[derive(Debug)]
pub struct MockIdentityVerifier {
    token: String,
    audience: String,
    claims: IdentityClaims,
    calls: AtomicUsize,
}

impl MockIdentityVerifier {
    pub fn new(token: impl Into<String>, audience: impl Into<String>, claims: IdentityClaims) -> Self {
        Self {
            token: token.into(),
            audience: audience.into(),
            claims,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityTokenVerifier for MockIdentityVerifier {
    async fn verify_signed_identity(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<IdentityClaims, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token != self.token {
            return Err(ProviderError::Rejected("InvalidSignature".to_string()));
        }
        if audience != self.audience {
            return Err(ProviderError::Rejected("InvalidAudience".to_string()));
        }
        Ok(self.claims.clone())
    }
}
