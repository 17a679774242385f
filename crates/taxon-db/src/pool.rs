//! PostgreSQL connection pool for the worker.
//!
//! The processor runs one job at a time, so the pool stays small: a handful of
//! connections covers the poll query, the job being processed, and progress
//! updates issued while it runs.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use taxon_core::{Error, Result};

pub const DB_MAX_CONNECTIONS: u32 = 5;
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

pub const ENV_DB_MAX_CONNECTIONS: &str = "TAXON_DB_MAX_CONNECTIONS";
pub const ENV_DB_ACQUIRE_TIMEOUT_SECS: &str = "TAXON_DB_ACQUIRE_TIMEOUT_SECS";

/// Pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DB_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Load from environment variables, ignoring unparseable values.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TAXON_DB_MAX_CONNECTIONS` | `5` |
    /// | `TAXON_DB_ACQUIRE_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<u32>(ENV_DB_MAX_CONNECTIONS) {
            config = config.with_max_connections(n);
        }
        if let Some(secs) = env_parse::<u64>(ENV_DB_ACQUIRE_TIMEOUT_SECS) {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparseable pool setting");
            None
        }
    }
}

/// Open a pool against `database_url`.
pub async fn connect_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: u32,
    pub max: u32,
}

impl PoolHealth {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle() as u32,
            max: pool.options().get_max_connections(),
        }
    }

    pub fn in_use(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }

    /// Every connection is open and checked out.
    pub fn is_saturated(&self) -> bool {
        self.size >= self.max && self.idle == 0
    }
}

/// Log pool occupancy every `every`, warning while it is saturated.
pub fn spawn_pool_monitor(pool: PgPool, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let health = PoolHealth::of(&pool);
            if health.is_saturated() {
                warn!(
                    subsystem = "db",
                    component = "pool",
                    in_use = health.in_use(),
                    max = health.max,
                    "Database pool saturated"
                );
            } else {
                debug!(
                    subsystem = "db",
                    component = "pool",
                    in_use = health.in_use(),
                    idle = health.idle,
                    "Pool health"
                );
            }
        }
    })
}
