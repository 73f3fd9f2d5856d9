use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_TOKEN_EXPIRY_DAYS: i64 = 365;
const MAX_AUTH_STATE_TTL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub api_key: ApiKeyConfig,
    pub github: GitHubOAuthConfig,
    pub google: GoogleOAuthConfig,
    pub sessions: SessionConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    pub checksum_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthConfig {
    /// Expected `aud` of identity tokens.
    pub client_id: String,
    pub jwks_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub auth_state_ttl_minutes: i64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Mark auth cookies `Secure`.
    pub secure_cookies: bool,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                access_token_secret: get_env("ACCESS_TOKEN_SECRET", None, is_prod)?,
                refresh_token_secret: get_env("REFRESH_TOKEN_SECRET", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRY_MINUTES",
                    "30",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
            },
            api_key: ApiKeyConfig {
                checksum_secret: get_env("API_KEY_CHECKSUM_SECRET", None, is_prod)?,
            },
            github: GitHubOAuthConfig {
                client_id: get_env("GITHUB_CLIENT_ID", None, is_prod)?,
                client_secret: get_env("GITHUB_CLIENT_SECRET", None, is_prod)?,
                token_url: get_env(
                    "GITHUB_TOKEN_URL",
                    Some("https://github.com/login/oauth/access_token"),
                    false,
                )?,
                api_url: get_env("GITHUB_API_URL", Some("https://api.github.com"), false)?,
            },
            google: GoogleOAuthConfig {
                client_id: get_env("GOOGLE_CLIENT_ID", None, is_prod)?,
                jwks_uri: get_env(
                    "GOOGLE_JWKS_URI",
                    Some("https://www.googleapis.com/oauth2/v3/certs"),
                    false,
                )?,
            },
            sessions: SessionConfig {
                auth_state_ttl_minutes: parse_env("AUTH_STATE_TTL_MINUTES", "15", false)?,
                cleanup_interval_seconds: parse_env("CLEANUP_INTERVAL_SECONDS", "300", false)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                secure_cookies: parse_env("SECURE_COOKIES", if is_prod { "true" } else { "false" }, false)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        let durations = [
            (
                "ACCESS_TOKEN_EXPIRY_MINUTES",
                self.jwt.access_token_expiry_minutes,
                MAX_ACCESS_TOKEN_EXPIRY_MINUTES,
            ),
            (
                "REFRESH_TOKEN_EXPIRY_DAYS",
                self.jwt.refresh_token_expiry_days,
                MAX_REFRESH_TOKEN_EXPIRY_DAYS,
            ),
            (
                "AUTH_STATE_TTL_MINUTES",
                self.sessions.auth_state_ttl_minutes,
                MAX_AUTH_STATE_TTL_MINUTES,
            ),
        ];
        for (key, value, max) in durations {
            if value <= 0 || value > max {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be between 1 and {}, got {}",
                    key,
                    max,
                    value
                )));
            }
        }

        if self.sessions.cleanup_interval_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CLEANUP_INTERVAL_SECONDS must be positive"
            )));
        }

        let secrets = [
            ("ACCESS_TOKEN_SECRET", &self.jwt.access_token_secret),
            ("REFRESH_TOKEN_SECRET", &self.jwt.refresh_token_secret),
            ("API_KEY_CHECKSUM_SECRET", &self.api_key.checksum_secret),
        ];
        for (key, value) in secrets {
            if value.trim().is_empty() {
                return Err(AppError::ConfigError(anyhow::anyhow!("{} must not be empty", key)));
            }
        }

        if self.jwt.access_token_secret == self.jwt.refresh_token_secret {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.security.secure_cookies {
                tracing::error!("Auth cookies are not marked Secure in production");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: core_config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/identity_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            access_token_secret: "access-secret".to_string(),
            refresh_token_secret: "refresh-secret".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 7,
        },
        api_key: ApiKeyConfig {
            checksum_secret: "checksum-secret".to_string(),
        },
        github: GitHubOAuthConfig {
            client_id: "gh-client".to_string(),
            client_secret: "gh-secret".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            api_url: "https://api.github.com".to_string(),
        },
        google: GoogleOAuthConfig {
            client_id: "google-client".to_string(),
            jwks_uri: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
        },
        sessions: SessionConfig {
            auth_state_ttl_minutes: 15,
            cleanup_interval_seconds: 300,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            secure_cookies: false,
        },
    }
}
