//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use uuid::Uuid;

use super::{CleanupReport, Store, StoreError, StoreTx};
use crate::models::{
    ApiKey, AuthState, Invite, OAuthProvider, SessionRecord, Team, TeamMember, User,
};

const INSERT_USER: &str = r#"
    INSERT INTO users (id, name, email, last_sign_in_at, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

const INSERT_TEAM: &str = r#"
    INSERT INTO teams (id, name, owner_user_id, created_at)
    VALUES ($1, $2, $3, $4)
"#;

const INSERT_TEAM_MEMBER: &str = r#"
    INSERT INTO team_membership (team_id, user_id, role, role_updated_at, created_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (team_id, user_id) DO NOTHING
"#;

const INSERT_API_KEY: &str = r#"
    INSERT INTO api_keys (key_value, app_id, key_prefix, checksum, revoked, last_seen, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

const REVOKE_API_KEYS: &str =
    "UPDATE api_keys SET revoked = TRUE WHERE app_id = $1 AND revoked = FALSE";

const INSERT_AUTH_SESSION: &str = r#"
    INSERT INTO auth_sessions (
        jti, user_id, team_id, provider, provider_profile,
        access_token_hash, refresh_token_hash, access_expires_at, expires_at, created_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

const DELETE_AUTH_SESSION: &str = "DELETE FROM auth_sessions WHERE jti = $1";

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bind_api_key<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    key: &'q ApiKey,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(&key.key_value)
        .bind(key.app_id)
        .bind(&key.key_prefix)
        .bind(&key.checksum)
        .bind(key.revoked)
        .bind(key.last_seen)
        .bind(key.created_at)
}

fn bind_session<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    record: &'q SessionRecord,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(record.jti)
        .bind(record.user_id)
        .bind(record.team_id)
        .bind(record.provider.as_str())
        .bind(&record.provider_profile)
        .bind(&record.access_token_hash)
        .bind(&record.refresh_token_hash)
        .bind(record.access_expires_at)
        .bind(record.expires_at)
        .bind(record.created_at)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        bind_api_key(sqlx::query(INSERT_API_KEY), key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_api_key_owner(&self, key_value: &str) -> Result<Option<Uuid>, StoreError> {
        let owner = sqlx::query_scalar::<_, Uuid>(
            "SELECT app_id FROM api_keys WHERE key_value = $1 AND revoked = FALSE",
        )
        .bind(key_value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner)
    }

    async fn touch_api_key_seen(
        &self,
        key_value: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE api_keys SET last_seen = $2 WHERE key_value = $1 AND (last_seen IS NULL OR last_seen < $2)",
        )
        .bind(key_value)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_api_keys_for_app(&self, app_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(REVOKE_API_KEYS)
            .bind(app_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_auth_state(&self, auth_state: &AuthState) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO auth_states (id, state, provider, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(auth_state.id)
        .bind(&auth_state.state)
        .bind(auth_state.provider.as_str())
        .bind(auth_state.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_auth_state(
        &self,
        state: &str,
        provider: OAuthProvider,
    ) -> Result<Option<AuthState>, StoreError> {
        let auth_state = sqlx::query_as::<_, AuthState>(
            "SELECT id, state, provider, created_at FROM auth_states WHERE state = $1 AND provider = $2",
        )
        .bind(state)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(auth_state)
    }

    async fn delete_auth_state(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM auth_states WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn touch_user_last_sign_in(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_sign_in_at = $2, updated_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_own_team(&self, user_id: Uuid) -> Result<Option<Team>, StoreError> {
        let team = sqlx::query_as::<_, Team>(
            "SELECT * FROM teams WHERE owner_user_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(team)
    }

    async fn find_team_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, StoreError> {
        let member = sqlx::query_as::<_, TeamMember>(
            "SELECT * FROM team_membership WHERE team_id = $1 AND user_id = $2",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn insert_invite(&self, invite: &Invite) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invites (
                id, invited_by_user_id, invited_to_team_id, invited_as_role,
                email, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invite.id)
        .bind(invite.invited_by_user_id)
        .bind(invite.invited_to_team_id)
        .bind(invite.invited_as_role.as_str())
        .bind(&invite.email)
        .bind(invite.created_at)
        .bind(invite.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_valid_invites_for_email(
        &self,
        email: &str,
        updated_after: DateTime<Utc>,
    ) -> Result<Vec<Invite>, StoreError> {
        let invites = sqlx::query_as::<_, Invite>(
            "SELECT * FROM invites WHERE email = $1 AND updated_at > $2 ORDER BY created_at ASC",
        )
        .bind(email)
        .bind(updated_after)
        .fetch_all(&self.pool)
        .await?;
        Ok(invites)
    }

    async fn insert_auth_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        bind_session(sqlx::query(INSERT_AUTH_SESSION), record)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_auth_session_by_jti(
        &self,
        jti: Uuid,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let record =
            sqlx::query_as::<_, SessionRecord>("SELECT * FROM auth_sessions WHERE jti = $1")
                .bind(jti)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    async fn delete_auth_session_by_jti(&self, jti: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(DELETE_AUTH_SESSION)
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_sessions_and_states(
        &self,
        now: DateTime<Utc>,
        state_cutoff: DateTime<Utc>,
    ) -> Result<CleanupReport, StoreError> {
        let sessions = sqlx::query("DELETE FROM auth_sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let auth_states = sqlx::query("DELETE FROM auth_states WHERE created_at < $1")
            .bind(state_cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(CleanupReport {
            sessions,
            auth_states,
        })
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StoreError::from(e)
        })?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(INSERT_USER)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.last_sign_in_at)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_team(&mut self, team: &Team) -> Result<(), StoreError> {
        sqlx::query(INSERT_TEAM)
            .bind(team.id)
            .bind(&team.name)
            .bind(team.owner_user_id)
            .bind(team.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_team_member(&mut self, member: &TeamMember) -> Result<bool, StoreError> {
        let result = sqlx::query(INSERT_TEAM_MEMBER)
            .bind(member.team_id)
            .bind(member.user_id)
            .bind(member.role.as_str())
            .bind(member.role_updated_at)
            .bind(member.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_invite(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM invites WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_api_key(&mut self, key: &ApiKey) -> Result<(), StoreError> {
        bind_api_key(sqlx::query(INSERT_API_KEY), key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn revoke_api_keys_for_app(&mut self, app_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(REVOKE_API_KEYS)
            .bind(app_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_auth_session(&mut self, record: &SessionRecord) -> Result<(), StoreError> {
        bind_session(sqlx::query(INSERT_AUTH_SESSION), record)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_auth_session_by_jti(&mut self, jti: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(DELETE_AUTH_SESSION)
            .bind(jti)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
