//! User model - dashboard users created by federated sign-in.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity.
///
/// `email` is matched exactly, without case folding: `Ann@x.io` and
/// `ann@x.io` are two different users.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub last_sign_in_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, not yet persisted, user.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            last_sign_in_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// First whitespace separated word of the name, or the local part of the
    /// email when the name is blank.
    pub fn first_name(&self) -> &str {
        self.name
            .split_whitespace()
            .next()
            .unwrap_or_else(|| self.email.split('@').next().unwrap_or_default())
    }

    /// Name given to the team provisioned alongside this user.
    pub fn default_team_name(&self) -> String {
        format!("{}'s team", self.first_name())
    }
}
