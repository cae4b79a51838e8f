use anyhow::{Context, Result};

use crate::store::adapter::AdapterKind;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub admin_password: String,
    /// Which persistence backend the record store writes through.
    pub active_adapter: AdapterKind,
    /// Directory holding the static-file adapter pair.
    pub data_dir: String,
    pub session_ttl_secs: i64,
    pub migration_batch_size: usize,
    pub migration_batch_delay_ms: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            admin_password: require_env("ADMIN_PASSWORD")?,
            active_adapter: std::env::var("ACTIVE_ADAPTER")
                .unwrap_or_else(|_| "kv".to_string())
                .parse()
                .map_err(|e: String| anyhow::anyhow!("ACTIVE_ADAPTER: {e}"))?,
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            session_ttl_secs: parse_env("SESSION_TTL_SECS", 1800)?,
            migration_batch_size: parse_env("MIGRATION_BATCH_SIZE", 25)?,
            migration_batch_delay_ms: parse_env("MIGRATION_BATCH_DELAY_MS", 500)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("'{key}' must be a valid value")),
        Err(_) => Ok(default),
    }
}
