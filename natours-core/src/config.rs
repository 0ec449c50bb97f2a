//! Configuration management
//!
//! Settings come from defaults, an optional TOML file and environment
//! overrides, in that order.

use crate::error::{ErrorContext, NatoursError, NatoursResult};
use crate::logging::LoggingConfig;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Shortest accepted signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted token, cookie or reset lifetime (ten years)
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NatoursConfig {
    pub auth: AuthConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Credential subsystem settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for bearer tokens
    pub jwt_secret: String,
    pub token_lifetime_secs: u64,
    pub reset_token_lifetime_secs: u64,
    pub cookie_lifetime_days: u32,
    pub min_password_length: usize,
    /// Marks token cookies `Secure`
    pub production: bool,
    pub hasher: HasherConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_lifetime_secs: 90 * 24 * 3600,
            reset_token_lifetime_secs: 15 * 60,
            cookie_lifetime_days: 90,
            min_password_length: 8,
            production: false,
            hasher: HasherConfig::default(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .field("reset_token_lifetime_secs", &self.reset_token_lifetime_secs)
            .field("cookie_lifetime_days", &self.cookie_lifetime_days)
            .field("min_password_length", &self.min_password_length)
            .field("production", &self.production)
            .field("hasher", &self.hasher)
            .finish()
    }
}

impl AuthConfig {
    /// Defaults with the given signing secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            ..Self::default()
        }
    }

    pub fn token_lifetime(&self) -> Duration {
        lifetime(self.token_lifetime_secs)
    }

    pub fn reset_token_lifetime(&self) -> Duration {
        lifetime(self.reset_token_lifetime_secs)
    }

    pub fn cookie_lifetime(&self) -> Duration {
        lifetime(u64::from(self.cookie_lifetime_days) * 24 * 3600)
    }
}

fn lifetime(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_LIFETIME_SECS) as i64)
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

/// Default argon2id memory cost (64 MiB)
pub const DEFAULT_MEMORY_COST_KIB: u32 = 64 * 1024;

/// Default argon2id passes
pub const DEFAULT_TIME_COST: u32 = 3;

impl Default for HasherConfig {
    /// Roughly the cost of bcrypt at work factor 12 (a few hundred
    /// milliseconds per hash on a server core)
    fn default() -> Self {
        Self {
            memory_cost_kib: DEFAULT_MEMORY_COST_KIB,
            time_cost: DEFAULT_TIME_COST,
            parallelism: 1,
        }
    }
}

impl HasherConfig {
    /// Minimal cost, for tests only
    pub fn insecure_fast() -> Self {
        Self {
            memory_cost_kib: 64,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite URL; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Externally visible base URL, used in reset links
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: None,
            public_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn config_failure(message: String, operation: &str) -> NatoursError {
    NatoursError::Config {
        message,
        source: None,
        context: ErrorContext::new("config").with_operation(operation),
    }
}

impl NatoursConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> NatoursResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| NatoursError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("read_file"),
        })?;

        toml::from_str(&content).map_err(|e| NatoursError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("parse_toml"),
        })
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> NatoursResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> NatoursResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(value) = lookup("JWT_EXPIRES_IN_SECS") {
            self.auth.token_lifetime_secs = parse_var("JWT_EXPIRES_IN_SECS", &value)?;
        }
        if let Some(value) = lookup("JWT_COOKIE_EXPIRES_IN_DAYS") {
            self.auth.cookie_lifetime_days = parse_var("JWT_COOKIE_EXPIRES_IN_DAYS", &value)?;
        }
        if let Some(value) = lookup("RESET_TOKEN_EXPIRES_IN_SECS") {
            self.auth.reset_token_lifetime_secs =
                parse_var("RESET_TOKEN_EXPIRES_IN_SECS", &value)?;
        }
        if let Some(env) = lookup("NATOURS_ENV") {
            self.auth.production = env.eq_ignore_ascii_case("production");
        }
        if let Some(host) = lookup("NATOURS_HOST") {
            self.server.host = host;
        }
        if let Some(value) = lookup("NATOURS_PORT") {
            self.server.port = parse_var("NATOURS_PORT", &value)?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.server.database_url = Some(url);
        }
        if let Some(url) = lookup("NATOURS_PUBLIC_URL") {
            self.server.public_url = url;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> NatoursResult<()> {
        let auth = &self.auth;

        if auth.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(config_failure(
                format!(
                    "auth.jwt_secret must be at least {} bytes (set JWT_SECRET)",
                    MIN_SECRET_LEN
                ),
                "validate",
            ));
        }

        for (name, secs) in [
            ("auth.token_lifetime_secs", auth.token_lifetime_secs),
            ("auth.reset_token_lifetime_secs", auth.reset_token_lifetime_secs),
            (
                "auth.cookie_lifetime_days",
                u64::from(auth.cookie_lifetime_days) * 24 * 3600,
            ),
        ] {
            if secs == 0 || secs > MAX_LIFETIME_SECS {
                return Err(config_failure(
                    format!("{} must be positive and at most ten years", name),
                    "validate",
                ));
            }
        }

        if auth.min_password_length == 0 {
            return Err(config_failure(
                "auth.min_password_length must be greater than 0".to_string(),
                "validate",
            ));
        }

        let hasher = &auth.hasher;
        if hasher.time_cost == 0
            || hasher.parallelism == 0
            || hasher.memory_cost_kib < 8 * hasher.parallelism
        {
            return Err(config_failure(
                "auth.hasher needs time_cost >= 1, parallelism >= 1 and memory_cost_kib >= 8 * parallelism"
                    .to_string(),
                "validate",
            ));
        }

        url::Url::parse(&self.server.public_url).map_err(|e| NatoursError::Config {
            message: format!("server.public_url is not a valid URL: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("validate"),
        })?;

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> NatoursResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| config_failure(format!("{} has an invalid value", name), "apply_env"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults() {
        let config = NatoursConfig::default();
        assert_eq!(config.auth.reset_token_lifetime(), Duration::minutes(15));
        assert_eq!(config.auth.min_password_length, 8);
        assert!(!config.auth.production);
        assert_eq!(config.server.address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_default_hasher_cost() {
        let hasher = HasherConfig::default();
        assert_eq!(hasher.memory_cost_kib, 64 * 1024);
        assert_eq!(hasher.time_cost, 3);
        assert_eq!(hasher.parallelism, 1);

        let fast = HasherConfig::insecure_fast();
        assert!(fast.memory_cost_kib < hasher.memory_cost_kib);
        assert!(fast.time_cost < hasher.time_cost);
    }

    #[test]
    fn test_default_secret_fails_validation() {
        let err = NatoursConfig::default().validate().unwrap_err();
        assert!(matches!(err, NatoursError::Config { .. }));
    }

    #[test]
    fn test_validate_accepts_configured_secret() {
        let config = NatoursConfig {
            auth: AuthConfig::with_secret(SECRET),
            ..NatoursConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_lifetime_and_bad_hasher() {
        let mut config = NatoursConfig {
            auth: AuthConfig::with_secret(SECRET),
            ..NatoursConfig::default()
        };
        config.auth.reset_token_lifetime_secs = 0;
        assert!(config.validate().is_err());

        config.auth.reset_token_lifetime_secs = 900;
        config.auth.hasher.parallelism = 4;
        config.auth.hasher.memory_cost_kib = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_merges_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[auth]
jwt_secret = "{SECRET}"
reset_token_lifetime_secs = 600

[auth.hasher]
time_cost = 3

[server]
port = 9000
"#
        )
        .unwrap();

        let config = NatoursConfig::from_file(file.path()).unwrap();
        assert_eq!(config.auth.jwt_secret, SECRET);
        assert_eq!(config.auth.reset_token_lifetime(), Duration::minutes(10));
        assert_eq!(config.auth.hasher.time_cost, 3);
        assert_eq!(config.auth.hasher.memory_cost_kib, DEFAULT_MEMORY_COST_KIB);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[auth\njwt_secret = 1").unwrap();

        let err = NatoursConfig::from_file(file.path()).unwrap_err();
        assert_eq!(err.context().operation.as_deref(), Some("parse_toml"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("JWT_SECRET", SECRET),
            ("JWT_EXPIRES_IN_SECS", "3600"),
            ("JWT_COOKIE_EXPIRES_IN_DAYS", "7"),
            ("NATOURS_ENV", "production"),
            ("NATOURS_PORT", "3000"),
            ("DATABASE_URL", "sqlite://natours.db"),
        ]
        .into_iter()
        .collect();

        let mut config = NatoursConfig::default();
        config
            .apply_env_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.auth.jwt_secret, SECRET);
        assert_eq!(config.auth.token_lifetime(), Duration::hours(1));
        assert_eq!(config.auth.cookie_lifetime(), Duration::days(7));
        assert!(config.auth.production);
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.server.database_url.as_deref(),
            Some("sqlite://natours.db")
        );
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = NatoursConfig::default();
        let result = config.apply_env_from(|key| {
            (key == "NATOURS_PORT").then(|| "eighty".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", AuthConfig::with_secret(SECRET));
        assert!(!debug.contains(SECRET));
    }
}
