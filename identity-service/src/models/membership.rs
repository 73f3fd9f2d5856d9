//! Team membership and pending invites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown team role: {0}")]
pub struct UnknownRole(pub String);

/// Role of a member within a team, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Owner,
    Admin,
    Developer,
    Viewer,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Developer => "developer",
            TeamRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TeamRole::Owner),
            "admin" => Ok(TeamRole::Admin),
            "developer" => Ok(TeamRole::Developer),
            "viewer" => Ok(TeamRole::Viewer),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl TryFrom<String> for TeamRole {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Row of `team_membership`. `(team_id, user_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct TeamMember {
    pub team_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: TeamRole,
    pub role_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TeamMember {
    pub fn new(team_id: Uuid, user_id: Uuid, role: TeamRole) -> Self {
        let now = Utc::now();
        Self {
            team_id,
            user_id,
            role,
            role_updated_at: now,
            created_at: now,
        }
    }
}

/// Invitation for `email` to join a team. Resent invites bump `updated_at`,
/// which is what validity is measured from.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Invite {
    pub id: Uuid,
    pub invited_by_user_id: Uuid,
    pub invited_to_team_id: Uuid,
    #[sqlx(try_from = "String")]
    pub invited_as_role: TeamRole,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invite {
    pub fn new(
        invited_by_user_id: Uuid,
        invited_to_team_id: Uuid,
        invited_as_role: TeamRole,
        email: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invited_by_user_id,
            invited_to_team_id,
            invited_as_role,
            email: email.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Membership the invitee gets on acceptance.
    pub fn membership_for(&self, user_id: Uuid) -> TeamMember {
        TeamMember::new(self.invited_to_team_id, user_id, self.invited_as_role)
    }
}
