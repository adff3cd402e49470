//! Service configuration loaded from environment variables.

use anyhow::{Context, Result, bail};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::omdb::OMDB_API_BASE;

/// Upper bound on the retention window, a century.
pub const MAX_CACHE_EXPIRY_HOURS: u32 = 100 * 365 * 24;

#[derive(Debug, Clone)]
pub struct Config {
    /// OMDb credential, required.
    pub omdb_api_key: String,
    pub omdb_base_url: String,
    /// Postgres connection string; the in-memory store is used without one.
    pub database_url: Option<String>,
    /// Records created longer ago than this are purged by a cache refresh.
    pub cache_expiry_hours: u32,
    /// Zero disables the scheduled sweep.
    pub cache_sweep_interval: Duration,
    /// Zero disables periodic stats logging.
    pub stats_log_interval: Duration,
    pub upstream_timeout: Duration,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(omdb_api_key) = var("OMDB_API_KEY") else {
            bail!("OMDb API key missing! Set OMDB_API_KEY");
        };

        let cache_expiry_hours: u32 =
            parse_or("CACHE_EXPIRY_HOURS", var("CACHE_EXPIRY_HOURS"), 24)?;
        if cache_expiry_hours > MAX_CACHE_EXPIRY_HOURS {
            bail!(
                "CACHE_EXPIRY_HOURS must be at most {MAX_CACHE_EXPIRY_HOURS}, got {cache_expiry_hours}"
            );
        }

        Ok(Self {
            omdb_api_key,
            omdb_base_url: var("OMDB_BASE_URL").unwrap_or_else(|| OMDB_API_BASE.to_string()),
            database_url: var("DATABASE_URL"),
            cache_expiry_hours,
            cache_sweep_interval: Duration::from_secs(parse_or(
                "CACHE_SWEEP_INTERVAL_SECS",
                var("CACHE_SWEEP_INTERVAL_SECS"),
                3600,
            )?),
            stats_log_interval: Duration::from_secs(parse_or(
                "STATS_LOG_INTERVAL_SECS",
                var("STATS_LOG_INTERVAL_SECS"),
                300,
            )?),
            upstream_timeout: Duration::from_secs(parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                var("UPSTREAM_TIMEOUT_SECS"),
                10,
            )?),
            port: parse_or("PORT", var("PORT"), 8080)?,
        })
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
