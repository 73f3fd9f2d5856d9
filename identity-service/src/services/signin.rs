//! Federated sign-in.
//!
//! Authorization-code flow (GitHub): `init` records the caller's `state`,
//! `complete_with_code` consumes it and trades the code for a profile.
//! Identity-token flow (Google): the provider-signed credential is verified
//! and its nonce checked against the caller's raw nonce.
//!
//! Both flows end in [`SigninOrchestrator::admit`], which provisions first
//! time users (user and own team in one transaction), accepts their pending
//! team invites and issues a session.

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::checksum::{digests_match, sha256_hex};
use super::error::AuthError;
use super::identity::IdentityResolver;
use super::providers::{CodeExchangeProvider, IdentityTokenVerifier};
use super::session::SessionManager;
use super::store::{in_transaction, Store, StoreError};
use crate::models::{AuthState, OAuthProvider, Team, TeamMember, TeamRole, User};

/// Invites not resent within this many hours are ignored.
pub const TEAM_INVITE_VALIDITY_HOURS: i64 = 48;

/// Outcome of a successful sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct SignInResult {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub own_team_id: Uuid,
    pub is_new_user: bool,
}

#[derive(Clone)]
pub struct SigninOrchestrator {
    store: Arc<dyn Store>,
    identities: IdentityResolver,
    sessions: SessionManager,
    github: Arc<dyn CodeExchangeProvider>,
    google: Arc<dyn IdentityTokenVerifier>,
    google_audience: String,
    auth_state_ttl: Duration,
}

impl SigninOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        sessions: SessionManager,
        github: Arc<dyn CodeExchangeProvider>,
        google: Arc<dyn IdentityTokenVerifier>,
        google_audience: impl Into<String>,
        auth_state_ttl: Duration,
    ) -> Self {
        Self {
            identities: IdentityResolver::new(store.clone()),
            store,
            sessions,
            github,
            google,
            google_audience: google_audience.into(),
            auth_state_ttl,
        }
    }

    fn code_exchange(
        &self,
        provider: OAuthProvider,
    ) -> Result<&dyn CodeExchangeProvider, AuthError> {
        match provider {
            OAuthProvider::GitHub => Ok(self.github.as_ref()),
            OAuthProvider::Google => Err(AuthError::ProviderExchangeFailed(format!(
                "{} does not support the authorization-code flow",
                provider
            ))),
        }
    }

    /// Record a new handshake for `(state, provider)`.
    #[tracing::instrument(skip(self, state))]
    pub async fn init(&self, provider: OAuthProvider, state: &str) -> Result<(), AuthError> {
        self.code_exchange(provider)?;

        match self
            .store
            .insert_auth_state(&AuthState::new(provider, state))
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(_)) => Err(AuthError::DuplicateState),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, state, code))]
    pub async fn complete_with_code(
        &self,
        provider: OAuthProvider,
        state: &str,
        code: &str,
    ) -> Result<SignInResult, AuthError> {
        let exchange = self.code_exchange(provider)?;

        let auth_state = self
            .store
            .find_auth_state(state, provider)
            .await?
            .filter(|s| !s.is_stale(self.auth_state_ttl, Utc::now()))
            .ok_or(AuthError::UnknownState)?;

        let access_token = exchange
            .exchange_authorization_code(code)
            .await
            .map_err(|e| AuthError::ProviderExchangeFailed(e.to_string()))?;

        if let Err(e) = self.store.delete_auth_state(auth_state.id).await {
            tracing::warn!(error = %e, provider = %provider, "Failed to remove oauth state");
        }

        let profile = exchange
            .fetch_profile(&access_token)
            .await
            .map_err(|e| AuthError::ProviderProfileFailed(e.to_string()))?;

        if profile.email.is_empty() {
            return Err(AuthError::ProviderProfileFailed(
                "profile has no email".to_string(),
            ));
        }

        self.admit(&profile.email, &profile.name, provider, profile.raw)
            .await
    }

    /// Sign in with a Google identity token.
    ///
    /// `nonce` and `state` must come together. When neither is sent the
    /// token is still accepted, since some clients cannot supply them.
    #[tracing::instrument(skip_all)]
    pub async fn complete_with_identity_token(
        &self,
        credential: &str,
        state: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<SignInResult, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::InvalidIdentityToken(
                "missing credential".to_string(),
            ));
        }

        let state = state.filter(|s| !s.is_empty());
        let nonce = nonce.filter(|n| !n.is_empty());
        match (nonce, state) {
            (Some(_), None) => return Err(AuthError::MissingPairedParameter("state")),
            (None, Some(_)) => return Err(AuthError::MissingPairedParameter("nonce")),
            _ => {}
        }

        let claims = self
            .google
            .verify_signed_identity(credential, &self.google_audience)
            .await
            .map_err(|e| AuthError::InvalidIdentityToken(e.to_string()))?;

        if let Some(nonce) = nonce {
            let expected = sha256_hex(nonce.as_bytes());
            let asserted = claims.nonce.as_deref().unwrap_or_default();
            if !digests_match(&expected, asserted) {
                return Err(AuthError::NonceMismatch);
            }
        }

        let name = claims.name.clone().unwrap_or_default();
        self.admit(&claims.email, &name, OAuthProvider::Google, claims.profile())
            .await
    }

    /// Add the user to every team with a valid invite for `email`, consuming
    /// the invites. Each invite is accepted in its own transaction; the first
    /// failure stops the run.
    #[tracing::instrument(skip(self, email))]
    pub async fn accept_invites_for_email(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<usize, AuthError> {
        let issued_after = Utc::now() - Duration::hours(TEAM_INVITE_VALIDITY_HOURS);
        let invites = self
            .store
            .find_valid_invites_for_email(email, issued_after)
            .await?;

        let mut accepted = 0;
        for invite in invites {
            let member = invite.membership_for(user_id);
            let invite_id = invite.id;
            in_transaction(self.store.as_ref(), move |tx| {
                Box::pin(async move {
                    tx.insert_team_member(&member).await?;
                    tx.delete_invite(invite_id).await?;
                    Ok::<_, AuthError>(())
                })
            })
            .await?;

            tracing::info!(
                user_id = %user_id,
                team_id = %invite.invited_to_team_id,
                role = %invite.invited_as_role,
                "Team invite accepted"
            );
            accepted += 1;
        }

        Ok(accepted)
    }

    /// Insert the user, their own team and the owner membership together.
    async fn provision(&self, user: &User) -> Result<(), AuthError> {
        let team = Team::owned_by(user);
        let owner = TeamMember::new(team.id, user.id, TeamRole::Owner);
        let staged = user.clone();
        in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                tx.insert_user(&staged).await?;
                tx.insert_team(&team).await?;
                tx.insert_team_member(&owner).await?;
                Ok::<_, AuthError>(())
            })
        })
        .await
    }

    /// Resolve the local user, provisioning on first sight, and issue a
    /// session bound to the user's own team.
    async fn admit(
        &self,
        email: &str,
        name: &str,
        provider: OAuthProvider,
        profile: Value,
    ) -> Result<SignInResult, AuthError> {
        let (user, is_new_user) = self.identities.resolve_or_create(email, name).await?;

        let (user, is_new_user) = if is_new_user {
            match self.provision(&user).await {
                Ok(()) => {
                    tracing::info!(user_id = %user.id, provider = %provider, "User provisioned");
                    if let Err(e) = self.accept_invites_for_email(user.id, &user.email).await {
                        tracing::warn!(user_id = %user.id, error = %e, "Accepting team invites failed");
                    }
                    (user, true)
                }
                // A concurrent first sign-in for the same email won the insert
                Err(AuthError::PersistError(StoreError::Conflict(reason))) => {
                    match self.identities.resolve_or_create(email, name).await? {
                        (existing, false) => {
                            tracing::info!(user_id = %existing.id, "User provisioned concurrently");
                            self.store
                                .touch_user_last_sign_in(existing.id, Utc::now())
                                .await?;
                            (existing, false)
                        }
                        (_, true) => {
                            return Err(AuthError::PersistError(StoreError::Conflict(reason)))
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        } else {
            self.store
                .touch_user_last_sign_in(user.id, Utc::now())
                .await?;
            (user, false)
        };

        let team = self
            .store
            .find_own_team(user.id)
            .await?
            .ok_or(AuthError::OwnTeamMissing(user.id))?;

        let session = self
            .sessions
            .issue(user.id, team.id, provider, profile)
            .await?;

        Ok(SignInResult {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            session_id: session.jti,
            user_id: user.id,
            own_team_id: team.id,
            is_new_user,
        })
    }
}
