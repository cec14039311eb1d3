#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! JSON configuration. Every field has a default, so an empty object (or no
//! file at all) yields a runnable in-memory setup.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result as AnyResult};
use serde::{Deserialize, Serialize};

use crate::lib_cpu::{DEFAULT_BUFFER_SIZE, DEFAULT_SAFETY_FACTOR, MIN_BUFFER_SIZE};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    pub shutdown_timeout_seconds: u64,
    pub burn: BurnConfig,
    pub limits: LimitsConfig,
    pub corpus: CorpusConfig,
    pub pool: PoolConfig,
    pub store: StoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            shutdown_timeout_seconds: 5,
            burn: BurnConfig::default(),
            limits: LimitsConfig::default(),
            corpus: CorpusConfig::default(),
            pool: PoolConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BurnConfig {
    /// Size of the random buffer every work unit digests.
    pub buffer_size: usize,
    /// Fraction of the requested budget at which the burn loop stops.
    pub safety_factor: f64,
    /// Permit wall-clock accounting when thread cpu time is unavailable.
    pub allow_wall_clock_fallback: bool,
}

impl Default for BurnConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            allow_wall_clock_fallback: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_cpu_ms: u64,
    pub max_io_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_cpu_ms: 60_000,
            max_io_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Number of records a seed without an explicit count creates.
    pub count: u64,
    /// Length in bytes of each placeholder value.
    pub record_size: usize,
    /// Cache entry time-to-live; 0 keeps entries forever.
    pub ttl_seconds: u64,
    pub seed_on_start: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            record_size: 64,
            ttl_seconds: 0,
            seed_on_start: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_size: u32,
    pub max_size: u32,
    /// 0 disables lifetime-based recycling.
    pub max_lifetime_seconds: u64,
    /// 0 disables the periodic health check.
    pub health_check_interval_seconds: u64,
    pub acquire_timeout_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 16,
            max_lifetime_seconds: 1800,
            health_check_interval_seconds: 30,
            acquire_timeout_seconds: 5,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn max_lifetime(&self) -> Option<Duration> {
        non_zero_secs(self.max_lifetime_seconds)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Option<Duration> {
        non_zero_secs(self.health_check_interval_seconds)
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds.max(1))
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process corpus; no network round trip.
    #[default]
    Memory,
    Redis(RedisSettings),
    Postgres(PostgresSettings),
}

impl StoreConfig {
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Redis(_) => "redis",
            StoreConfig::Postgres(_) => "postgres",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            username: None,
            password: None,
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default = "default_postgres_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            url: default_postgres_url(),
            username: None,
            password: None,
            table: default_table(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_postgres_url() -> String {
    "postgres://postgres@127.0.0.1:5432/postgres".to_string()
}

fn default_key_prefix() -> String {
    "corpus".to_string()
}

fn default_table() -> String {
    "corpus".to_string()
}

impl AppConfig {
    /// Reads `path` when given, otherwise returns defaults. Validates either way.
    pub fn load(path: Option<&Path>) -> AnyResult<Self> {
        let config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("read config {}", p.display()))?;
                Self::from_json(&raw).with_context(|| format!("parse config {}", p.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> AnyResult<Self> {
        serde_json::from_str(raw).context("decode json config")
    }

    pub fn validate(&self) -> AnyResult<()> {
        if !(self.burn.safety_factor > 0.0 && self.burn.safety_factor <= 1.0) {
            bail!("burn.safety_factor must be in (0, 1]");
        }
        if self.burn.buffer_size < MIN_BUFFER_SIZE {
            bail!("burn.buffer_size must be >= {MIN_BUFFER_SIZE}");
        }
        if self.pool.max_size == 0 {
            bail!("pool.max_size must be > 0");
        }
        if self.pool.min_size > self.pool.max_size {
            bail!("pool.min_size must not exceed pool.max_size");
        }
        if self.corpus.count == 0 {
            bail!("corpus.count must be > 0");
        }
        if let StoreConfig::Postgres(pg) = &self.store {
            if !is_sql_identifier(&pg.table) {
                bail!(format!("store.table is not a plain identifier: {}", pg.table));
            }
        }
        if let StoreConfig::Redis(r) = &self.store {
            if r.key_prefix.trim().is_empty() {
                bail!("store.key_prefix is empty");
            }
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, so it can be spliced into SQL text.
#[must_use]
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
