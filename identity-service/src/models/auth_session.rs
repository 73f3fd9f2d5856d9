//! Auth session models.
//!
//! [`AuthSession`] is what issuance hands back to the caller. It is stored
//! as a [`SessionRecord`], which keeps digests of the tokens instead of the
//! tokens themselves.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::OAuthProvider;
use crate::services::checksum::sha256_hex;

/// A freshly issued session, tokens included.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub provider: OAuthProvider,
    pub provider_profile: Value,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            jti: self.jti,
            user_id: self.user_id,
            team_id: self.team_id,
            provider: self.provider,
            provider_profile: self.provider_profile.clone(),
            access_token_hash: sha256_hex(self.access_token.as_bytes()),
            refresh_token_hash: sha256_hex(self.refresh_token.as_bytes()),
            created_at: self.created_at,
            access_expires_at: self.access_expires_at,
            expires_at: self.expires_at,
        }
    }
}

/// Persisted auth session row. `jti` is the primary key.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SessionRecord {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub team_id: Uuid,
    #[sqlx(try_from = "String")]
    pub provider: OAuthProvider,
    pub provider_profile: Value,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub created_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Avatar URL from the stored provider profile, if the provider sent one.
    pub fn avatar_url(&self) -> Option<&str> {
        self.provider_profile
            .get(self.provider.avatar_field())
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn session(provider: OAuthProvider, profile: Value) -> AuthSession {
        let now = Utc::now();
        AuthSession {
            jti: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            provider,
            provider_profile: profile,
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            created_at: now,
            access_expires_at: now + Duration::minutes(30),
            expires_at: now + Duration::days(7),
        }
    }

    #[test]
    fn test_record_never_holds_raw_tokens() {
        let record = session(OAuthProvider::GitHub, json!({})).to_record();
        assert_ne!(record.access_token_hash, "access");
        assert_ne!(record.refresh_token_hash, "refresh");
        assert_eq!(record.access_token_hash.len(), 64);
    }

    #[test]
    fn test_avatar_url_per_provider() {
        let github = session(OAuthProvider::GitHub, json!({"avatar_url": "https://a/1.png"}));
        assert_eq!(github.to_record().avatar_url(), Some("https://a/1.png"));

        let google = session(OAuthProvider::Google, json!({"avatar_url": "https://a/1.png"}));
        assert_eq!(google.to_record().avatar_url(), None);

        let google = session(OAuthProvider::Google, json!({"picture": "https://g/2.png"}));
        assert_eq!(google.to_record().avatar_url(), Some("https://g/2.png"));
    }

    #[test]
    fn test_expiry() {
        let mut record = session(OAuthProvider::GitHub, json!({})).to_record();
        let now = Utc::now();
        assert!(!record.is_expired(now));
        record.expires_at = now - Duration::seconds(1);
        assert!(record.is_expired(now));
    }
}
