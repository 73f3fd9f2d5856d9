//! In-flight authorization-code handshakes.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::OAuthProvider;

/// One pending authorization-code handshake, keyed by `(state, provider)`.
///
/// Consumed at code exchange or reaped by cleanup once older than the TTL.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AuthState {
    pub id: Uuid,
    pub state: String,
    #[sqlx(try_from = "String")]
    pub provider: OAuthProvider,
    pub created_at: DateTime<Utc>,
}

impl AuthState {
    pub fn new(provider: OAuthProvider, state: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: state.into(),
            provider,
            created_at: Utc::now(),
        }
    }

    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.created_at + ttl < now
    }
}
