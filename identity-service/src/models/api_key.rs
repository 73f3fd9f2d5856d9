//! API key model - opaque credentials bound to an app.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Fixed prefix identifying this credential class.
pub const API_KEY_PREFIX: &str = "msrsh";

/// Separator between the three segments of a serialized key.
pub const API_KEY_SEPARATOR: char = '_';

/// API key entity.
///
/// Only `revoked` (false to true) and `last_seen` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ApiKey {
    pub app_id: Uuid,
    pub key_prefix: String,
    pub key_value: String,
    pub checksum: String,
    pub revoked: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn new(app_id: Uuid, key_value: String, checksum: String) -> Self {
        Self {
            app_id,
            key_prefix: API_KEY_PREFIX.to_string(),
            key_value,
            checksum,
            revoked: false,
            last_seen: None,
            created_at: Utc::now(),
        }
    }

    /// Split a serialized key into `(prefix, value, checksum)`.
    ///
    /// Returns `None` unless there are exactly three non-empty segments.
    pub fn split(raw: &str) -> Option<(&str, &str, &str)> {
        let mut parts = raw.split(API_KEY_SEPARATOR);
        let prefix = parts.next()?;
        let value = parts.next()?;
        let checksum = parts.next()?;
        if parts.next().is_some() || prefix.is_empty() || value.is_empty() || checksum.is_empty() {
            return None;
        }
        Some((prefix, value, checksum))
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.key_prefix,
            self.key_value,
            self.checksum,
            sep = API_KEY_SEPARATOR
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApiKey {
        ApiKey::new(Uuid::new_v4(), "abc".to_string(), "def".to_string())
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "msrsh_abc_def");
    }

    #[test]
    fn test_split() {
        assert_eq!(ApiKey::split("msrsh_abc_def"), Some(("msrsh", "abc", "def")));
        for raw in ["", "abc", "msrsh_only", "bad_prefix_x_y", "msrsh__def", "msrsh_abc_"] {
            assert_eq!(ApiKey::split(raw), None, "{raw:?} should not split");
        }
    }
}
