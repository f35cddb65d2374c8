//! Configuration manager for warden.
//!
//! Values come from `config.yaml`, then environment variables (a `.env` file
//! is honoured) override them.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 30;
pub const DEFAULT_REFRESH_TTL_MINUTES: i64 = 7 * 24 * 60;

/// Where the instance runs. Anything but production exposes OTPs in
/// responses and accepts the captcha bypass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Production,
            _ => Environment::Development,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    pub env: Environment,
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Upper bound of a request, in seconds.
    pub request_timeout: u64,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Redis configuration.
    #[serde(skip_serializing)]
    pub redis: Option<Redis>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Token,
    /// Related to one-time codes.
    #[serde(skip_serializing)]
    pub otp: Otp,
    /// Related to the captcha verification service.
    #[serde(skip_serializing)]
    pub captcha: Option<Captcha>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: "warden".into(),
            env: Environment::default(),
            port: DEFAULT_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            postgres: None,
            redis: None,
            argon2: None,
            token: Token::default(),
            otp: Otp::default(),
            captcha: None,
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Full connection URL. Takes precedence over the other fields.
    pub url: Option<String>,
    /// Hostname:(?port) for PostgreSQL instance.
    #[serde(default)]
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Redis configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Redis {
    pub url: String,
}

/// Captcha service configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Captcha {
    /// Base URL, `/api/v1/verify-captcha` is appended.
    pub url: String,
    /// Sent as `Secret-Key`.
    #[serde(default)]
    pub secret: String,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
///
/// Lifetimes are kept as raw strings so a malformed value degrades to the
/// default instead of refusing to boot.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: Option<String>,
    pub refresh_ttl_minutes: Option<String>,
}

fn minutes_or(raw: Option<&str>, fallback: i64, name: &str) -> chrono::Duration {
    match raw.map(|v| v.trim().parse::<i64>()) {
        Some(Ok(minutes)) if minutes > 0 => chrono::Duration::minutes(minutes),
        Some(_) => {
            tracing::warn!(%name, value = ?raw, fallback, "invalid token lifetime, using default");
            chrono::Duration::minutes(fallback)
        },
        None => {
            tracing::warn!(%name, fallback, "token lifetime not set, using default");
            chrono::Duration::minutes(fallback)
        },
    }
}

impl Token {
    pub fn access_ttl(&self) -> chrono::Duration {
        minutes_or(
            self.access_ttl_minutes.as_deref(),
            DEFAULT_ACCESS_TTL_MINUTES,
            "access",
        )
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        minutes_or(
            self.refresh_ttl_minutes.as_deref(),
            DEFAULT_REFRESH_TTL_MINUTES,
            "refresh",
        )
    }
}

/// One-time code configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Otp {
    /// Number of digits.
    pub length: usize,
    /// Lifetime of a held signup.
    pub pending_ttl_minutes: u64,
    /// Lifetime of a password reset code.
    pub forgot_ttl_minutes: u64,
}

impl Default for Otp {
    fn default() -> Self {
        Self {
            length: crate::otp::DEFAULT_OTP_LENGTH,
            pending_ttl_minutes: 6,
            forgot_ttl_minutes: 5,
        }
    }
}

impl Otp {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_minutes * 60)
    }

    pub fn forgot_ttl(&self) -> Duration {
        Duration::from_secs(self.forgot_ttl_minutes * 60)
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location, then applies environment overrides.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(config) => config,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        config.version = VERSION.to_owned();
        config.apply_env(|key| std::env::var(key).ok());

        Arc::new(config)
    }

    /// Override values with environment variables, fetched through
    /// `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(env) = lookup("ENV") {
            self.env = env.parse().unwrap_or_default();
        }
        if let Some(port) = lookup("REST_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(%port, "ignoring invalid `REST_PORT`"),
            }
        }
        if let Some(url) = lookup("DB_URL") {
            self.postgres.get_or_insert_with(Postgres::default).url = Some(url);
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis = Some(Redis { url });
        }
        if let Some(url) = lookup("CAPTCHA_BASE_URL") {
            self.captcha.get_or_insert_with(Captcha::default).url = url;
        }
        if let Some(secret) = lookup("CAPTCHA_SECRET_KEY") {
            self.captcha.get_or_insert_with(Captcha::default).secret = secret;
        }
        if let Some(secret) = lookup("ACCESS_TOKEN_SECRET") {
            self.token.access_secret = secret;
        }
        if let Some(secret) = lookup("REFRESH_TOKEN_SECRET") {
            self.token.refresh_secret = secret;
        }
        if let Some(minutes) = lookup("ACCESS_TOKEN_EXPIRATION_MINUTES") {
            self.token.access_ttl_minutes = Some(minutes);
        }
        if let Some(minutes) = lookup("REFRESH_TOKEN_EXPIRATION_MINUTES") {
            self.token.refresh_ttl_minutes = Some(minutes);
        }
        if let Some(minutes) = lookup("OTP_TTL_MINUTES") {
            match minutes.parse() {
                Ok(minutes) => self.otp.forgot_ttl_minutes = minutes,
                Err(_) => tracing::warn!(%minutes, "ignoring invalid `OTP_TTL_MINUTES`"),
            }
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_yaml_with_defaults() {
        let config: Configuration = serde_yaml::from_str(
            r#"
name: warden
env: production
postgres:
  address: localhost:5432
otp:
  length: 6
"#,
        )
        .unwrap();

        assert!(config.env.is_production());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.otp.length, 6);
        assert_eq!(config.otp.forgot_ttl_minutes, 5);
        assert_eq!(
            config.postgres.map(|p| p.address).as_deref(),
            Some("localhost:5432")
        );
        assert!(config.redis.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("ENV", "production"),
            ("REST_PORT", "9000"),
            ("DB_URL", "postgres://u:p@db/warden"),
            ("REDIS_URL", "redis://cache:6379"),
            ("ACCESS_TOKEN_SECRET", "a"),
            ("REFRESH_TOKEN_SECRET", "r"),
            ("ACCESS_TOKEN_EXPIRATION_MINUTES", "15"),
            ("OTP_TTL_MINUTES", "3"),
            ("CAPTCHA_BASE_URL", "http://captcha:3000"),
            ("CAPTCHA_SECRET_KEY", "s3cret"),
        ]);

        let mut config = Configuration::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.env.is_production());
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.postgres.and_then(|p| p.url).as_deref(),
            Some("postgres://u:p@db/warden")
        );
        assert_eq!(config.redis.map(|r| r.url).as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.token.access_ttl(), chrono::Duration::minutes(15));
        assert_eq!(config.token.refresh_ttl(), chrono::Duration::days(7));
        assert_eq!(config.otp.forgot_ttl(), Duration::from_secs(180));
        assert_eq!(
            config.captcha,
            Some(Captcha {
                url: "http://captcha:3000".into(),
                secret: "s3cret".into(),
            })
        );
    }

    #[test]
    fn test_token_lifetime_fallback() {
        let token = Token {
            access_ttl_minutes: Some("soon".into()),
            refresh_ttl_minutes: Some("-4".into()),
            ..Default::default()
        };
        assert_eq!(token.access_ttl(), chrono::Duration::minutes(30));
        assert_eq!(token.refresh_ttl(), chrono::Duration::days(7));
    }
}
