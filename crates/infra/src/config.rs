//! Environment-driven configuration for the storage layer.

use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::catalog::DEFAULT_CACHE_TTL;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Connection and cache settings, read from the environment.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub catalog_cache_ttl: Duration,
}

impl StoreConfig {
    /// Read configuration from the environment. `DATABASE_URL` is required;
    /// everything else has a default.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let max_connections = read_env("DATABASE_MAX_CONNECTIONS")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let acquire_timeout_ms = read_env("DATABASE_ACQUIRE_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS);
        let catalog_cache_ttl = read_env::<u64>("CATALOG_CACHE_TTL_SECONDS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL);

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
            catalog_cache_ttl,
        })
    }

    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await
            .context("failed to connect to postgres")
    }
}

fn read_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => {
            let parsed = raw
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw}"))?;
            Ok(Some(parsed))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
