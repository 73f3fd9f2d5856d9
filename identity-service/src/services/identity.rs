use std::sync::Arc;

use super::error::AuthError;
use super::store::Store;
use crate::models::User;

/// Maps a federated identity onto a local user.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Look the user up by exact email. When absent, returns an unpersisted
    /// user and `true`; the caller provisions it.
    pub async fn resolve_or_create(
        &self,
        email: &str,
        display_name: &str,
    ) -> Result<(User, bool), AuthError> {
        match self.store.find_user_by_email(email).await? {
            Some(user) => Ok((user, false)),
            None => Ok((User::new(display_name.trim(), email), true)),
        }
    }
}
