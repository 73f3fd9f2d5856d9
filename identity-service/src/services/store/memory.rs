//! In-memory store for tests and local development.
//!
//! Transactions take the table lock for their whole lifetime and work on a
//! staged copy, so they are serializable: a second transaction only sees the
//! first one's writes after commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{CleanupReport, Store, StoreError, StoreTx};
use crate::models::{
    ApiKey, AuthState, Invite, OAuthProvider, SessionRecord, Team, TeamMember, User,
};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertTeam,
    InsertAuthSession,
    DeleteAuthState,
    TouchApiKeySeen,
    DeleteInvite,
    Cleanup,
    /// The next email lookup misses, as if another sign-in had not yet
    /// committed. Clears itself once triggered.
    StaleUserLookup,
}

#[derive(Debug, Default, Clone)]
struct Tables {
    api_keys: HashMap<String, ApiKey>,
    auth_states: HashMap<Uuid, AuthState>,
    users: HashMap<Uuid, User>,
    teams: HashMap<Uuid, Team>,
    members: HashMap<(Uuid, Uuid), TeamMember>,
    invites: HashMap<Uuid, Invite>,
    sessions: HashMap<Uuid, SessionRecord>,
    fail_points: HashSet<FailPoint>,
}

impl Tables {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.fail_points.contains(&point) {
            return Err(StoreError::Unavailable(format!("{:?} failed", point)));
        }
        Ok(())
    }

    fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {} exists", user.email)));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    fn insert_team(&mut self, team: &Team) -> Result<(), StoreError> {
        self.check(FailPoint::InsertTeam)?;
        if !self.users.contains_key(&team.owner_user_id) {
            return Err(StoreError::Conflict(format!(
                "owner {} does not exist",
                team.owner_user_id
            )));
        }
        self.teams.insert(team.id, team.clone());
        Ok(())
    }

    fn insert_team_member(&mut self, member: &TeamMember) -> Result<bool, StoreError> {
        if !self.teams.contains_key(&member.team_id) || !self.users.contains_key(&member.user_id) {
            return Err(StoreError::Conflict(format!(
                "team {} or user {} does not exist",
                member.team_id, member.user_id
            )));
        }
        let key = (member.team_id, member.user_id);
        if self.members.contains_key(&key) {
            return Ok(false);
        }
        self.members.insert(key, member.clone());
        Ok(true)
    }

    fn insert_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError> {
        if self.api_keys.contains_key(&key.key_value) {
            return Err(StoreError::Conflict("api key exists".to_string()));
        }
        self.api_keys.insert(key.key_value.clone(), key.clone());
        Ok(())
    }

    fn revoke_api_keys_for_app(&mut self, app_id: Uuid) -> u64 {
        let mut revoked = 0;
        for key in self.api_keys.values_mut() {
            if key.app_id == app_id && !key.revoked {
                key.revoked = true;
                revoked += 1;
            }
        }
        revoked
    }

    fn insert_auth_session(&mut self, record: &SessionRecord) -> Result<(), StoreError> {
        self.check(FailPoint::InsertAuthSession)?;
        if self.sessions.contains_key(&record.jti) {
            return Err(StoreError::Conflict(format!("session {} exists", record.jti)));
        }
        self.sessions.insert(record.jti, record.clone());
        Ok(())
    }
}

/// [`Store`] kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `point` fail until [`MemoryStore::clear_failures`] is called.
    pub async fn fail_on(&self, point: FailPoint) {
        self.tables.lock().await.fail_points.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.tables.lock().await.fail_points.clear();
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn team_count(&self) -> usize {
        self.tables.lock().await.teams.len()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }

    pub async fn invite_count(&self) -> usize {
        self.tables.lock().await.invites.len()
    }

    /// Members of `team_id`, oldest first.
    pub async fn team_members(&self, team_id: Uuid) -> Vec<TeamMember> {
        let mut members: Vec<TeamMember> = self
            .tables
            .lock()
            .await
            .members
            .values()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created_at);
        members
    }

    pub async fn auth_state_count(&self) -> usize {
        self.tables.lock().await.auth_states.len()
    }

    pub async fn api_keys_for_app(&self, app_id: Uuid) -> Vec<ApiKey> {
        let mut keys: Vec<ApiKey> = self
            .tables
            .lock()
            .await
            .api_keys
            .values()
            .filter(|k| k.app_id == app_id)
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.created_at);
        keys
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        self.tables.lock().await.insert_api_key(key)
    }

    async fn find_api_key_owner(&self, key_value: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .api_keys
            .get(key_value)
            .filter(|k| !k.revoked)
            .map(|k| k.app_id))
    }

    async fn touch_api_key_seen(
        &self,
        key_value: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check(FailPoint::TouchApiKeySeen)?;
        if let Some(key) = tables.api_keys.get_mut(key_value) {
            if key.last_seen.map_or(true, |seen| seen < at) {
                key.last_seen = Some(at);
            }
        }
        Ok(())
    }

    async fn revoke_api_keys_for_app(&self, app_id: Uuid) -> Result<u64, StoreError> {
        Ok(self.tables.lock().await.revoke_api_keys_for_app(app_id))
    }

    async fn insert_auth_state(&self, auth_state: &AuthState) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let exists = tables
            .auth_states
            .values()
            .any(|s| s.state == auth_state.state && s.provider == auth_state.provider);
        if exists {
            return Err(StoreError::Conflict(format!(
                "auth state {} exists for {}",
                auth_state.state, auth_state.provider
            )));
        }
        tables.auth_states.insert(auth_state.id, auth_state.clone());
        Ok(())
    }

    async fn find_auth_state(
        &self,
        state: &str,
        provider: OAuthProvider,
    ) -> Result<Option<AuthState>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .auth_states
            .values()
            .find(|s| s.state == state && s.provider == provider)
            .cloned())
    }

    async fn delete_auth_state(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check(FailPoint::DeleteAuthState)?;
        tables.auth_states.remove(&id);
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.fail_points.remove(&FailPoint::StaleUserLookup) {
            return Ok(None);
        }
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn touch_user_last_sign_in(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.last_sign_in_at = at;
            user.updated_at = at;
        }
        Ok(())
    }

    async fn find_own_team(&self, user_id: Uuid) -> Result<Option<Team>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .teams
            .values()
            .filter(|t| t.owner_user_id == user_id)
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn find_team_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .members
            .get(&(team_id, user_id))
            .cloned())
    }

    async fn insert_invite(&self, invite: &Invite) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.invites.contains_key(&invite.id) {
            return Err(StoreError::Conflict(format!("invite {} exists", invite.id)));
        }
        tables.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    async fn find_valid_invites_for_email(
        &self,
        email: &str,
        updated_after: DateTime<Utc>,
    ) -> Result<Vec<Invite>, StoreError> {
        let mut invites: Vec<Invite> = self
            .tables
            .lock()
            .await
            .invites
            .values()
            .filter(|i| i.email == email && i.updated_at > updated_after)
            .cloned()
            .collect();
        invites.sort_by_key(|i| i.created_at);
        Ok(invites)
    }

    async fn insert_auth_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.tables.lock().await.insert_auth_session(record)
    }

    async fn find_auth_session_by_jti(
        &self,
        jti: Uuid,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(&jti).cloned())
    }

    async fn delete_auth_session_by_jti(&self, jti: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.sessions.remove(&jti).is_some())
    }

    async fn delete_expired_sessions_and_states(
        &self,
        now: DateTime<Utc>,
        state_cutoff: DateTime<Utc>,
    ) -> Result<CleanupReport, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check(FailPoint::Cleanup)?;

        let sessions_before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_at >= now);
        let states_before = tables.auth_states.len();
        tables.auth_states.retain(|_, s| s.created_at >= state_cutoff);

        Ok(CleanupReport {
            sessions: (sessions_before - tables.sessions.len()) as u64,
            auth_states: (states_before - tables.auth_states.len()) as u64,
        })
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.staged.insert_user(user)
    }

    async fn insert_team(&mut self, team: &Team) -> Result<(), StoreError> {
        self.staged.insert_team(team)
    }

    async fn insert_team_member(&mut self, member: &TeamMember) -> Result<bool, StoreError> {
        self.staged.insert_team_member(member)
    }

    async fn delete_invite(&mut self, id: Uuid) -> Result<bool, StoreError> {
        self.staged.check(FailPoint::DeleteInvite)?;
        Ok(self.staged.invites.remove(&id).is_some())
    }

    async fn insert_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError> {
        self.staged.insert_api_key(key)
    }

    async fn revoke_api_keys_for_app(&mut self, app_id: Uuid) -> Result<u64, StoreError> {
        Ok(self.staged.revoke_api_keys_for_app(app_id))
    }

    async fn insert_auth_session(&mut self, record: &SessionRecord) -> Result<(), StoreError> {
        self.staged.insert_auth_session(record)
    }

    async fn delete_auth_session_by_jti(&mut self, jti: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.sessions.remove(&jti).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeamRole;

    #[tokio::test]
    async fn test_uncommitted_transaction_is_invisible() {
        let store = MemoryStore::new();
        let user = User::new("Ada", "ada@example.com");

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        drop(tx);

        assert_eq!(store.user_count().await, 0);

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_user_by_id(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_duplicate_auth_state_conflicts() {
        let store = MemoryStore::new();
        store
            .insert_auth_state(&AuthState::new(OAuthProvider::GitHub, "s1"))
            .await
            .unwrap();

        let err = store
            .insert_auth_state(&AuthState::new(OAuthProvider::GitHub, "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store
            .insert_auth_state(&AuthState::new(OAuthProvider::Google, "s1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invite_validity_and_duplicate_membership() {
        let store = MemoryStore::new();
        let owner = User::new("Ada", "ada@example.com");
        let team = Team::owned_by(&owner);
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&owner).await.unwrap();
        tx.insert_team(&team).await.unwrap();
        let member = TeamMember::new(team.id, owner.id, TeamRole::Owner);
        assert!(tx.insert_team_member(&member).await.unwrap());
        assert!(!tx.insert_team_member(&member).await.unwrap());
        tx.commit().await.unwrap();

        let mut stale = Invite::new(owner.id, team.id, TeamRole::Viewer, "b@x.io");
        stale.updated_at = Utc::now() - chrono::Duration::hours(49);
        let fresh = Invite::new(owner.id, team.id, TeamRole::Admin, "b@x.io");
        store.insert_invite(&stale).await.unwrap();
        store.insert_invite(&fresh).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(48);
        let valid = store.find_valid_invites_for_email("b@x.io", cutoff).await.unwrap();
        assert_eq!(valid, vec![fresh]);
        assert!(store
            .find_valid_invites_for_email("B@x.io", cutoff)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_sensitive() {
        let store = MemoryStore::new();
        let user = User::new("Ann", "Ann@example.com");
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.find_user_by_email("Ann@example.com").await.unwrap().is_some());
        assert!(store.find_user_by_email("ann@example.com").await.unwrap().is_none());
    }
}
