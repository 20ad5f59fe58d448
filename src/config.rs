//! Configuration module for gatehouse.

use chrono::Duration;
use serde::Deserialize;
use std::path::Path;

use crate::{GatehouseError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty means permissive development mode.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/gatehouse.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Token and cookie configuration.
///
/// `jwt_secret` has no default on purpose: a missing secret is a fatal
/// startup condition, caught by [`Config::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret for access and refresh tokens.
    #[serde(default)]
    pub jwt_secret: String,
    /// Access token lifetime as a duration string (e.g. "15m").
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl: String,
    /// Refresh token lifetime as a duration string (e.g. "7d").
    /// Must be strictly greater than the access token lifetime.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl: String,
    /// Name of the refresh token cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Path scope of the refresh token cookie.
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
    /// Whether the refresh cookie carries the Secure attribute.
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    /// SameSite policy for the refresh cookie: "strict", "lax" or "none".
    #[serde(default = "default_cookie_same_site")]
    pub cookie_same_site: String,
    /// How many of a user's most recent refresh token records are
    /// hash-compared per refresh. Caps the per-request slow-hash cost.
    #[serde(default = "default_refresh_lookup_window")]
    pub refresh_lookup_window: u32,
}

fn default_access_ttl() -> String {
    "15m".to_string()
}

fn default_refresh_ttl() -> String {
    "7d".to_string()
}

fn default_cookie_name() -> String {
    "refresh_token".to_string()
}

fn default_cookie_path() -> String {
    "/api/auth".to_string()
}

fn default_cookie_secure() -> bool {
    true
}

fn default_cookie_same_site() -> String {
    "strict".to_string()
}

fn default_refresh_lookup_window() -> u32 {
    20
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl: default_access_ttl(),
            refresh_token_ttl: default_refresh_ttl(),
            cookie_name: default_cookie_name(),
            cookie_path: default_cookie_path(),
            cookie_secure: default_cookie_secure(),
            cookie_same_site: default_cookie_same_site(),
            refresh_lookup_window: default_refresh_lookup_window(),
        }
    }
}

impl AuthConfig {
    /// Parsed access token lifetime.
    pub fn access_ttl(&self) -> Result<Duration> {
        parse_duration(&self.access_token_ttl)
    }

    /// Parsed refresh token lifetime.
    pub fn refresh_ttl(&self) -> Result<Duration> {
        parse_duration(&self.refresh_token_ttl)
    }
}

/// CSRF token manager configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CsrfConfig {
    /// CSRF token lifetime as a duration string.
    #[serde(default = "default_csrf_ttl")]
    pub token_ttl: String,
    /// Interval between background sweeps of expired entries.
    #[serde(default = "default_csrf_sweep_interval")]
    pub sweep_interval: String,
}

fn default_csrf_ttl() -> String {
    "24h".to_string()
}

fn default_csrf_sweep_interval() -> String {
    "1h".to_string()
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl: default_csrf_ttl(),
            sweep_interval: default_csrf_sweep_interval(),
        }
    }
}

impl CsrfConfig {
    /// Parsed CSRF token lifetime.
    pub fn ttl(&self) -> Result<Duration> {
        parse_duration(&self.token_ttl)
    }

    /// Parsed sweep interval.
    pub fn sweep(&self) -> Result<Duration> {
        parse_duration(&self.sweep_interval)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/gatehouse.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token and cookie settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// CSRF settings.
    #[serde(default)]
    pub csrf: CsrfConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GatehouseError::Config(e.to_string()))
    }

    /// Validate settings that must hold before the process may serve.
    ///
    /// The signing secret is required, every duration string must parse,
    /// and the refresh token lifetime must be strictly greater than the
    /// access token lifetime.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(GatehouseError::Config(
                "auth.jwt_secret is required".to_string(),
            ));
        }

        let access = self.auth.access_ttl()?;
        let refresh = self.auth.refresh_ttl()?;
        if refresh <= access {
            return Err(GatehouseError::Config(format!(
                "auth.refresh_token_ttl ({}) must be greater than auth.access_token_ttl ({})",
                self.auth.refresh_token_ttl, self.auth.access_token_ttl
            )));
        }

        if self.auth.refresh_lookup_window == 0 {
            return Err(GatehouseError::Config(
                "auth.refresh_lookup_window must be at least 1".to_string(),
            ));
        }

        self.csrf.ttl()?;
        self.csrf.sweep()?;

        Ok(())
    }
}

/// Parse a duration string of the form `<number><unit>` where the unit is
/// one of `s`, `m`, `h` or `d` (e.g. "30s", "15m", "12h", "7d").
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: i64 = digits
        .parse()
        .map_err(|_| GatehouseError::Config(format!("invalid duration: {s:?}")))?;

    match unit {
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        _ => Err(GatehouseError::Config(format!("invalid duration: {s:?}"))),
    }
}
