//! Application configuration parsed from environment variables.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` loads `.env` (if present) and builds an `AppConfig` before the pool
//! is created. Everything except `DATABASE_URL` has a default so a local run
//! only needs a database.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 7;
pub const DEFAULT_SESSION_UPDATE_AGE_SECS: u64 = 60 * 60 * 24;
pub const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Session lifetime rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// How long a freshly issued (or refreshed) session stays valid.
    pub ttl: Duration,
    /// A session older than this since its last refresh gets its expiry extended.
    pub update_age: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            update_age: Duration::from_secs(DEFAULT_SESSION_UPDATE_AGE_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// External origin without trailing slash, e.g. `https://clinics.example.com`.
    pub base_url: String,
    pub cookie_secure: bool,
    pub session: SessionPolicy,
    pub db_max_connections: u32,
    pub static_dir: String,
}

impl AppConfig {
    /// Defaults for everything but the database URL.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            port: DEFAULT_PORT,
            base_url: format!("http://localhost:{DEFAULT_PORT}"),
            cookie_secure: false,
            session: SessionPolicy::default(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            static_dir: DEFAULT_STATIC_DIR.to_owned(),
        }
    }

    /// Build typed config from the process environment.
    ///
    /// Required:
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `APP_BASE_URL`: default `http://localhost:{PORT}`
    /// - `COOKIE_SECURE`: inferred from `APP_BASE_URL` scheme when absent
    /// - `SESSION_TTL_SECS`: default 7 days
    /// - `SESSION_UPDATE_AGE_SECS`: default 1 day
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `STATIC_DIR`: default `static`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when `DATABASE_URL` is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let port = env_parse_strict("PORT", DEFAULT_PORT)?;
        let base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();
        let cookie_secure = env_bool("COOKIE_SECURE").unwrap_or_else(|| base_url.starts_with("https://"));
        let session = SessionPolicy {
            ttl: Duration::from_secs(env_parse_strict("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?),
            update_age: Duration::from_secs(env_parse_strict(
                "SESSION_UPDATE_AGE_SECS",
                DEFAULT_SESSION_UPDATE_AGE_SECS,
            )?),
        };
        let db_max_connections = env_parse_strict("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| DEFAULT_STATIC_DIR.to_owned());

        Ok(Self { database_url, port, base_url, cookie_secure, session, db_max_connections, static_dir })
    }
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_bool(&raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Lenient parse: unset or malformed values fall back to `default`.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Strict parse: unset falls back to `default`, malformed is an error.
fn env_parse_strict<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var: key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
