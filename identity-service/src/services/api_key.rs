//! API key generation and verification.

use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use uuid::Uuid;

use super::checksum::Checksum;
use super::error::AuthError;
use super::store::{in_transaction, Store};
use crate::models::{ApiKey, API_KEY_PREFIX};

/// Number of random bytes behind the secret segment of a key.
const SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct ApiKeyManager {
    store: Arc<dyn Store>,
    checksum: Checksum,
}

impl ApiKeyManager {
    pub fn new(store: Arc<dyn Store>, checksum: Checksum) -> Self {
        Self { store, checksum }
    }

    /// Build a new, unpersisted key for `app_id`.
    pub fn generate(&self, app_id: Uuid) -> Result<ApiKey, AuthError> {
        let mut secret = [0u8; SECRET_BYTES];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| AuthError::RandomSourceError(e.to_string()))?;

        let key_value = hex::encode(secret);
        let checksum = self.checksum.compute(key_value.as_bytes());
        Ok(ApiKey::new(app_id, key_value, checksum))
    }

    pub fn serialize(key: &ApiKey) -> String {
        key.to_string()
    }

    /// Resolve a serialized key to the app that owns it.
    ///
    /// Structural and checksum failures are `MalformedKey` and never reach
    /// the store. Unknown and revoked keys are `NotFound`.
    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self, raw: &str) -> Result<Uuid, AuthError> {
        let (prefix, value, checksum) = ApiKey::split(raw).ok_or(AuthError::MalformedKey)?;
        if prefix != API_KEY_PREFIX || !self.checksum.verify(value.as_bytes(), checksum) {
            return Err(AuthError::MalformedKey);
        }

        let app_id = self
            .store
            .find_api_key_owner(value)
            .await?
            .ok_or(AuthError::NotFound)?;

        if let Err(e) = self.store.touch_api_key_seen(value, Utc::now()).await {
            tracing::warn!(app_id = %app_id, error = %e, "Failed to record api key last seen");
        }

        Ok(app_id)
    }

    /// Generate and persist a key for `app_id`.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, app_id: Uuid) -> Result<ApiKey, AuthError> {
        let key = self.generate(app_id)?;
        self.store.insert_api_key(&key).await?;
        tracing::info!(app_id = %app_id, "API key created");
        Ok(key)
    }

    #[tracing::instrument(skip(self))]
    pub async fn revoke_all(&self, app_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_api_keys_for_app(app_id).await?;
        tracing::info!(app_id = %app_id, revoked, "API keys revoked");
        Ok(revoked)
    }

    /// Revoke every key of `app_id` and persist a fresh one, atomically.
    #[tracing::instrument(skip(self))]
    pub async fn rotate(&self, app_id: Uuid) -> Result<ApiKey, AuthError> {
        let key = self.generate(app_id)?;
        let staged = key.clone();

        let revoked = in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let revoked = tx.revoke_api_keys_for_app(app_id).await?;
                tx.insert_api_key(&staged).await?;
                Ok::<_, AuthError>(revoked)
            })
        })
        .await?;

        tracing::info!(app_id = %app_id, revoked, "API key rotated");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::{FailPoint, MemoryStore};

    fn manager(store: &MemoryStore) -> ApiKeyManager {
        ApiKeyManager::new(
            Arc::new(store.clone()),
            Checksum::new("test-checksum-secret").unwrap(),
        )
    }

    #[test]
    fn test_generate_shape() {
        let manager = manager(&MemoryStore::new());
        let key = manager.generate(Uuid::new_v4()).unwrap();

        assert_eq!(key.key_prefix, API_KEY_PREFIX);
        assert_eq!(key.key_value.len(), 64);
        assert!(key.key_value.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!key.revoked);
        assert!(key.last_seen.is_none());

        let raw = ApiKeyManager::serialize(&key);
        assert!(raw.starts_with("msrsh_"));
        assert_eq!(raw.split('_').count(), 3);
    }

    #[test]
    fn test_generate_is_unique() {
        let manager = manager(&MemoryStore::new());
        let app_id = Uuid::new_v4();
        let a = manager.generate(app_id).unwrap();
        let b = manager.generate(app_id).unwrap();
        assert_ne!(a.key_value, b.key_value);
    }

    #[tokio::test]
    async fn test_resolve_records_last_seen() {
        let store = MemoryStore::new();
        let manager = manager(&store);
        let app_id = Uuid::new_v4();
        let key = manager.create(app_id).await.unwrap();

        assert_eq!(manager.resolve(&key.to_string()).await.unwrap(), app_id);
        assert!(store.api_keys_for_app(app_id).await[0].last_seen.is_some());
    }

    #[tokio::test]
    async fn test_last_seen_failure_does_not_fail_resolve() {
        let store = MemoryStore::new();
        let manager = manager(&store);
        let app_id = Uuid::new_v4();
        let key = manager.create(app_id).await.unwrap();

        store.fail_on(FailPoint::TouchApiKeySeen).await;
        assert_eq!(manager.resolve(&key.to_string()).await.unwrap(), app_id);
    }

    #[tokio::test]
    async fn test_structural_failures_are_malformed() {
        let manager = manager(&MemoryStore::new());
        for raw in ["", "abc", "bad_prefix_x_y", "msrsh_only_two_parts_", "msrsh_value_badchecksum"] {
            assert!(
                matches!(manager.resolve(raw).await, Err(AuthError::MalformedKey)),
                "{raw:?} should be malformed"
            );
        }
    }

    #[tokio::test]
    async fn test_wrong_prefix_with_valid_checksum_is_malformed() {
        let manager = manager(&MemoryStore::new());
        let key = manager.create(Uuid::new_v4()).await.unwrap();
        let raw = format!("other_{}_{}", key.key_value, key.checksum);

        assert!(matches!(manager.resolve(&raw).await, Err(AuthError::MalformedKey)));
    }

    #[tokio::test]
    async fn test_valid_but_unknown_key_is_not_found() {
        let manager = manager(&MemoryStore::new());
        let key = manager.generate(Uuid::new_v4()).unwrap();

        assert!(matches!(
            manager.resolve(&key.to_string()).await,
            Err(AuthError::NotFound)
        ));
    }
}
