use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown oauth provider: {0}")]
pub struct UnknownProvider(pub String);

/// Federated identity providers supported for dashboard sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    #[serde(rename = "github")]
    GitHub,
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "github",
            OAuthProvider::Google => "google",
        }
    }

    /// Key of the avatar URL inside the stored provider profile.
    pub fn avatar_field(&self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "avatar_url",
            OAuthProvider::Google => "picture",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(OAuthProvider::GitHub),
            "google" => Ok(OAuthProvider::Google),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

impl TryFrom<String> for OAuthProvider {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
