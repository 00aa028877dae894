//! Engine tunables and store selection, loaded from a RON file.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Gameplay tunables consumed by the registries, war board, trade scheduler
/// and power economy. Per-level tables are indexed by `power_level - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunks_per_level: [u32; 6],
    pub soldier_lives_per_level: [u32; 6],
    pub soldiers_per_level: [u32; 6],
    pub kills_per_level: u32,
    pub victory_power_bonus: f64,
    pub victory_cooldown_days: i64,
    /// Killing the enemy president ends the war on the spot.
    pub decapitation: bool,
    pub trade_interval_min_minutes: u32,
    pub trade_interval_max_minutes: u32,
    /// Real minutes per trade-interval minute.
    pub trade_minute_scale: i64,
    pub trade_fulfillment_threshold: u32,
    pub trade_power_increment: f64,
    pub trade_max_volume: u32,
    pub overflow_expiry_minutes: u32,
    pub power_sweep_secs: u64,
    pub trade_sweep_secs: u64,
    pub overflow_sweep_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunks_per_level: [16, 32, 64, 96, 128, 192],
            soldier_lives_per_level: [3, 3, 4, 4, 5, 6],
            soldiers_per_level: [5, 10, 15, 20, 30, 40],
            kills_per_level: 5,
            victory_power_bonus: 0.5,
            victory_cooldown_days: 7,
            decapitation: false,
            trade_interval_min_minutes: 1,
            trade_interval_max_minutes: 72,
            trade_minute_scale: 20,
            trade_fulfillment_threshold: 3,
            trade_power_increment: 0.25,
            trade_max_volume: 36 * 64,
            overflow_expiry_minutes: 24 * 60,
            power_sweep_secs: 300,
            trade_sweep_secs: 60,
            overflow_sweep_secs: 600,
        }
    }
}

fn per_level(table: &[u32; 6], level: u8) -> u32 {
    let idx = usize::from(level.clamp(1, 6)) - 1;
    table[idx]
}

impl EngineConfig {
    pub fn chunk_quota(&self, level: u8) -> u32 {
        per_level(&self.chunks_per_level, level)
    }

    pub fn soldier_lives(&self, level: u8) -> u32 {
        per_level(&self.soldier_lives_per_level, level)
    }

    pub fn soldier_capacity(&self, level: u8) -> u32 {
        per_level(&self.soldiers_per_level, level)
    }

    pub fn clamp_interval(&self, minutes: u32) -> u32 {
        minutes.clamp(
            self.trade_interval_min_minutes,
            self.trade_interval_max_minutes,
        )
    }

    /// Wall-clock delay between executions of a trade with this interval.
    pub fn trade_delay(&self, interval_minutes: u32) -> Duration {
        Duration::minutes(i64::from(interval_minutes) * self.trade_minute_scale)
    }

    pub fn victory_cooldown(&self) -> Duration {
        Duration::days(self.victory_cooldown_days)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trade_interval_min_minutes == 0
            || self.trade_interval_min_minutes > self.trade_interval_max_minutes
        {
            return Err(ConfigError::Invalid(format!(
                "trade interval bounds {}..{} are empty",
                self.trade_interval_min_minutes, self.trade_interval_max_minutes
            )));
        }
        if self.trade_max_volume == 0 {
            return Err(ConfigError::Invalid("trade_max_volume must be positive".into()));
        }
        if self.trade_fulfillment_threshold == 0 {
            return Err(ConfigError::Invalid(
                "trade_fulfillment_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Which relational engine backs the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    /// Embedded, single writer at a time.
    Sqlite { path: PathBuf },
    /// Networked, row-level concurrency.
    Postgres { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub max_connections: u32,
    /// How long a unit of work keeps retrying on "store busy".
    pub busy_timeout_ms: u64,
    /// How long to wait for the single-writer lock before giving up.
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite {
                path: PathBuf::from("sovereignty.db"),
            },
            max_connections: 4,
            busy_timeout_ms: 5_000,
            lock_timeout_ms: 10_000,
        }
    }
}

impl StoreConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::Sqlite { path: path.into() },
            ..Self::default()
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: StoreBackend::Postgres { url: url.into() },
            max_connections: 10,
            ..Self::default()
        }
    }

    pub fn url(&self) -> String {
        match &self.backend {
            StoreBackend::Sqlite { path } => format!("sqlite://{}?mode=rwc", path.display()),
            StoreBackend::Postgres { url } => url.clone(),
        }
    }

    pub fn busy_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.busy_timeout_ms)
    }

    pub fn lock_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub store: StoreConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: Config = ron::from_str(ron)?;
        config.engine.validate()?;
        Ok(config)
    }
}
