//! Environment-driven server configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::hasher::HashCost;
use crate::rate_limit::RateLimitConfig;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub cors_origins: Vec<String>,
    pub enable_hsts: bool,
    pub hash_cost: HashCost,
    /// `None` when rate limiting is off.
    pub rate_limit: Option<RateLimitConfig>,
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> bool {
    lookup(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = HashCost::default();
        let hash_cost = HashCost {
            memory_kib: parse(&lookup, "HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse(&lookup, "HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse(&lookup, "HASH_PARALLELISM", defaults.parallelism)?,
        };

        let rate_limit = if flag(&lookup, "RATE_LIMIT_ENABLED") {
            let d = RateLimitConfig::default();
            Some(RateLimitConfig {
                thread_limit: parse(&lookup, "RL_THREAD_LIMIT", d.thread_limit)?,
                thread_window: Duration::from_secs(parse(&lookup, "RL_THREAD_WINDOW", d.thread_window.as_secs())?),
                reply_limit: parse(&lookup, "RL_REPLY_LIMIT", d.reply_limit)?,
                reply_window: Duration::from_secs(parse(&lookup, "RL_REPLY_WINDOW", d.reply_window.as_secs())?),
            })
        } else {
            None
        };

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&lookup, "PORT", 8080)?,
            data_dir: lookup("BOARD_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            database_url: lookup("DATABASE_URL"),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            cors_origins,
            enable_hsts: flag(&lookup, "ENABLE_HSTS"),
            hash_cost,
            rate_limit,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}
