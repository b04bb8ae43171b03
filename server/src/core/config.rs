//! Environment-driven configuration
//!
//! All knobs come from `MO11Y_*` environment variables; defaults match the
//! constants module. Invalid auth configuration (missing or short pepper)
//! is a startup error, not a panic.

use anyhow::{bail, Result};

use super::constants::{
    DEFAULT_AUTH_DB_PATH, DEFAULT_CLEANUP_INTERVAL_MINS, DEFAULT_DB_PATH,
    DEFAULT_MAX_CONCURRENT_INGEST, DEFAULT_MAX_CONCURRENT_QUERY, DEFAULT_PORT,
    DEFAULT_RETENTION_HOURS, MIN_PEPPER_LEN,
};

/// Retention worker configuration
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Rows older than this are pruned; 0 disables the worker entirely
    pub retention_hours: u64,
    /// Cleanup cadence, clamped to at least one minute
    pub cleanup_interval_mins: u64,
}

impl RetentionConfig {
    pub fn enabled(&self) -> bool {
        self.retention_hours > 0
    }
}

/// Auth subsystem configuration (absent when auth is disabled)
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub db_path: String,
    pub pepper: String,
    /// Consumed once at startup to seed an admin key into an empty store
    pub bootstrap_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// DuckDB file path; empty string means in-memory
    pub db_path: String,
    pub retention: RetentionConfig,
    pub max_concurrent_ingest: usize,
    pub max_concurrent_query: usize,
    pub auth: Option<AuthConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build config from a variable lookup. Split out so tests can drive it
    /// without mutating process environment.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // An explicitly empty MO11Y_DB_PATH selects the in-memory engine
        let db_path = var("MO11Y_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let retention = RetentionConfig {
            retention_hours: parse_or(&var, "MO11Y_RETENTION_HOURS", DEFAULT_RETENTION_HOURS),
            cleanup_interval_mins: parse_or(
                &var,
                "MO11Y_CLEANUP_INTERVAL_MINS",
                DEFAULT_CLEANUP_INTERVAL_MINS,
            )
            .max(1),
        };

        let auth_disabled = var("MO11Y_AUTH_DISABLED").as_deref() == Some("true");
        let auth = if auth_disabled {
            None
        } else {
            let pepper = match var("MO11Y_AUTH_PEPPER") {
                Some(p) if !p.is_empty() => p,
                _ => bail!(
                    "MO11Y_AUTH_PEPPER is required when auth is enabled. \
                     Set MO11Y_AUTH_DISABLED=true to disable auth."
                ),
            };
            if pepper.len() < MIN_PEPPER_LEN {
                bail!("MO11Y_AUTH_PEPPER must be at least {MIN_PEPPER_LEN} characters");
            }
            Some(AuthConfig {
                db_path: var("MO11Y_AUTH_DB_PATH")
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| DEFAULT_AUTH_DB_PATH.to_string()),
                pepper,
                bootstrap_key: var("MO11Y_BOOTSTRAP_KEY").filter(|k| !k.is_empty()),
            })
        };

        Ok(Self {
            port: DEFAULT_PORT,
            db_path,
            retention,
            max_concurrent_ingest: parse_or(
                &var,
                "MO11Y_MAX_CONCURRENT_INGEST",
                DEFAULT_MAX_CONCURRENT_INGEST,
            ),
            max_concurrent_query: parse_or(
                &var,
                "MO11Y_MAX_CONCURRENT_QUERY",
                DEFAULT_MAX_CONCURRENT_QUERY,
            ),
            auth,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
