use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::User;

/// Team owned by a user. Every provisioned user owns exactly one.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// The own team of a freshly provisioned user.
    pub fn owned_by(user: &User) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: user.default_team_name(),
            owner_user_id: user.id,
            created_at: Utc::now(),
        }
    }
}
