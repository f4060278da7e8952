//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub generation_api_key: String,
    pub generation_api_base: Option<String>,
    pub generation_model: String,
    pub generation_timeout: Duration,
    pub max_article_chars: usize,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        // --- Load Server and Database Settings ---
        let bind_address =
            parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:8000".parse::<SocketAddr>().ok())?;
        let database_url = required("DATABASE_URL")?;
        let database_max_connections =
            parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(5u32))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Generation Provider Settings ---
        let generation_api_key = required("GENERATION_API_KEY")?;
        let generation_api_base = lookup("GENERATION_API_BASE").filter(|v| !v.trim().is_empty());
        let generation_model =
            lookup("GENERATION_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let generation_timeout =
            Duration::from_secs(parse_positive_or(&lookup, "GENERATION_TIMEOUT_SECS", 120u64)?);

        // --- Load Pipeline Limits ---
        let max_article_chars = parse_or(&lookup, "MAX_ARTICLE_CHARS", Some(15_000usize))?;
        let rate_limit_max_requests = parse_positive_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 2u32)?;
        let rate_limit_window =
            Duration::from_secs(parse_positive_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 3600u64)?);

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            generation_api_key,
            generation_api_base,
            generation_model,
            generation_timeout,
            max_article_chars,
            rate_limit_max_requests,
            rate_limit_window,
            allowed_origins,
        })
    }
}

/// Parses `key` when present, otherwise falls back to `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

/// Like `parse_or`, but zero is rejected.
fn parse_positive_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialEq + From<u8>,
    T::Err: std::fmt::Display,
{
    let value = parse_or(lookup, key, Some(default))?;
    if value == T::from(0) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}
