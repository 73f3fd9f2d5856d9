//! Session issuance, single-use rotation, revocation and cleanup.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::AuthError;
use super::jwt::{JwtService, TokenKind};
use super::store::{in_transaction, CleanupReport, Store};
use crate::models::{AuthSession, OAuthProvider, SessionRecord};

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn Store>,
    jwt: JwtService,
    auth_state_ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, jwt: JwtService, auth_state_ttl: Duration) -> Self {
        Self {
            store,
            jwt,
            auth_state_ttl,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Sign a token pair under a new `jti` without persisting anything.
    pub fn mint(
        &self,
        user_id: Uuid,
        team_id: Uuid,
        provider: OAuthProvider,
        provider_profile: Value,
    ) -> Result<AuthSession, AuthError> {
        let jti = Uuid::new_v4();
        let now = Utc::now();

        let access = self
            .jwt
            .sign(TokenKind::Access, user_id, jti, now)
            .map_err(|e| AuthError::SigningError(e.to_string()))?;
        let refresh = self
            .jwt
            .sign(TokenKind::Refresh, user_id, jti, now)
            .map_err(|e| AuthError::SigningError(e.to_string()))?;

        Ok(AuthSession {
            jti,
            user_id,
            team_id,
            provider,
            provider_profile,
            access_token: access.token,
            refresh_token: refresh.token,
            created_at: now,
            access_expires_at: access.expires_at,
            expires_at: refresh.expires_at,
        })
    }

    /// Mint and persist a new session. Tokens are only returned once the
    /// record is stored.
    #[tracing::instrument(skip(self, provider_profile))]
    pub async fn issue(
        &self,
        user_id: Uuid,
        team_id: Uuid,
        provider: OAuthProvider,
        provider_profile: Value,
    ) -> Result<AuthSession, AuthError> {
        let session = self.mint(user_id, team_id, provider, provider_profile)?;
        self.store.insert_auth_session(&session.to_record()).await?;

        tracing::info!(jti = %session.jti, user_id = %user_id, "Session issued");
        Ok(session)
    }

    /// Exchange the session `old_jti` for a new one.
    ///
    /// The old row is deleted and the new one inserted in one transaction.
    /// If the old row is already gone when the delete runs, nothing is
    /// written and the caller gets `SessionNotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn rotate(&self, old_jti: Uuid) -> Result<AuthSession, AuthError> {
        let old = self.find(old_jti).await?;

        let session = self.mint(old.user_id, old.team_id, old.provider, old.provider_profile)?;
        let record = session.to_record();

        in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                if !tx.delete_auth_session_by_jti(old_jti).await? {
                    return Err(AuthError::SessionNotFound);
                }
                tx.insert_auth_session(&record).await?;
                Ok::<_, AuthError>(())
            })
        })
        .await?;

        tracing::info!(old_jti = %old_jti, jti = %session.jti, "Session rotated");
        Ok(session)
    }

    /// Delete the session. Revoking an absent session succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, jti: Uuid) -> Result<(), AuthError> {
        let deleted = self.store.delete_auth_session_by_jti(jti).await?;
        tracing::info!(jti = %jti, deleted, "Session revoked");
        Ok(())
    }

    /// Live session `jti`. A session past its refresh expiry counts as
    /// gone even before cleanup removes it.
    pub async fn find(&self, jti: Uuid) -> Result<SessionRecord, AuthError> {
        self.store
            .find_auth_session_by_jti(jti)
            .await?
            .filter(|record| !record.is_expired(Utc::now()))
            .ok_or(AuthError::SessionNotFound)
    }

    /// Remove expired sessions and stale auth states. Failures are logged
    /// and reported as `None`.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Option<CleanupReport> {
        let state_cutoff = now - self.auth_state_ttl;
        match self
            .store
            .delete_expired_sessions_and_states(now, state_cutoff)
            .await
        {
            Ok(report) => {
                tracing::debug!(
                    sessions = report.sessions,
                    auth_states = report.auth_states,
                    "Cleanup finished"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cleanup of expired sessions and auth states failed");
                None
            }
        }
    }

    /// Run [`SessionManager::cleanup`] in the background.
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.cleanup(Utc::now()).await;
        })
    }

    /// Run cleanup every `period` until the task is aborted.
    pub fn spawn_periodic_cleanup(&self, period: std::time::Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                manager.cleanup(Utc::now()).await;
            }
        })
    }
}
