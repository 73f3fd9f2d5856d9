//! Persistence contract for keys, users, teams, memberships, auth states
//! and sessions.
//!
//! Multi-step writes go through [`StoreTx`]. A transaction that is dropped
//! without [`StoreTx::commit`] is rolled back.

mod memory;
mod postgres;

pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use super::error::AuthError;
use crate::models::{
    ApiKey, AuthState, Invite, OAuthProvider, SessionRecord, Team, TeamMember, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);

        if unique_violation {
            StoreError::Conflict(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

/// Rows removed by one cleanup sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions: u64,
    pub auth_states: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), StoreError>;

    /// Owner of an unrevoked key with this secret value.
    async fn find_api_key_owner(&self, key_value: &str) -> Result<Option<Uuid>, StoreError>;

    async fn touch_api_key_seen(&self, key_value: &str, at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Revoke every unrevoked key of the app, returning how many changed.
    async fn revoke_api_keys_for_app(&self, app_id: Uuid) -> Result<u64, StoreError>;

    /// Fails with [`StoreError::Conflict`] when `(state, provider)` exists.
    async fn insert_auth_state(&self, auth_state: &AuthState) -> Result<(), StoreError>;

    async fn find_auth_state(
        &self,
        state: &str,
        provider: OAuthProvider,
    ) -> Result<Option<AuthState>, StoreError>;

    async fn delete_auth_state(&self, id: Uuid) -> Result<(), StoreError>;

    /// Exact, case-sensitive match.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn touch_user_last_sign_in(&self, user_id: Uuid, at: DateTime<Utc>)
        -> Result<(), StoreError>;

    async fn find_own_team(&self, user_id: Uuid) -> Result<Option<Team>, StoreError>;

    async fn find_team_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, StoreError>;

    async fn insert_invite(&self, invite: &Invite) -> Result<(), StoreError>;

    /// Invites for `email` last updated after `updated_after`.
    async fn find_valid_invites_for_email(
        &self,
        email: &str,
        updated_after: DateTime<Utc>,
    ) -> Result<Vec<Invite>, StoreError>;

    async fn insert_auth_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn find_auth_session_by_jti(&self, jti: Uuid)
        -> Result<Option<SessionRecord>, StoreError>;

    /// Returns whether a row was deleted.
    async fn delete_auth_session_by_jti(&self, jti: Uuid) -> Result<bool, StoreError>;

    /// Delete sessions whose refresh expiry is before `now` and auth states
    /// created before `state_cutoff`.
    async fn delete_expired_sessions_and_states(
        &self,
        now: DateTime<Utc>,
        state_cutoff: DateTime<Utc>,
    ) -> Result<CleanupReport, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// An open transaction. Dropping it without committing rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;

    async fn insert_team(&mut self, team: &Team) -> Result<(), StoreError>;

    /// Returns false when the user is already a member of the team.
    async fn insert_team_member(&mut self, member: &TeamMember) -> Result<bool, StoreError>;

    /// Returns whether a row was deleted.
    async fn delete_invite(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError>;

    async fn revoke_api_keys_for_app(&mut self, app_id: Uuid) -> Result<u64, StoreError>;

    async fn insert_auth_session(&mut self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn delete_auth_session_by_jti(&mut self, jti: Uuid) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Run `work` inside one transaction: commit when it succeeds, roll back
/// when it fails.
pub async fn in_transaction<T, F>(store: &dyn Store, work: F) -> Result<T, AuthError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut Box<dyn StoreTx>) -> BoxFuture<'t, Result<T, AuthError>> + Send,
{
    let mut tx = store.begin().await?;

    match work(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Transaction rollback failed");
            }
            Err(err)
        }
    }
}
