use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::limits::{MAX_HOLD_TTL_MINUTES, MIN_HOLD_TTL_MINUTES};
use crate::model::Price;
use crate::pricing::DEFAULT_RATE_PER_HOUR;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub booking: BookingSettings,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub holds: HoldSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingSettings {
    pub hold_ttl_minutes: u64,
    #[serde(default = "default_rate")]
    pub default_rate_per_hour: Price,
}

fn default_rate() -> Price {
    DEFAULT_RATE_PER_HOUR
}

impl BookingSettings {
    /// Clamped to the supported range.
    pub fn hold_ttl(&self) -> Duration {
        let minutes = self.hold_ttl_minutes.clamp(MIN_HOLD_TTL_MINUTES, MAX_HOLD_TTL_MINUTES);
        Duration::from_secs(minutes * 60)
    }
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self { hold_ttl_minutes: 5, default_rate_per_hour: DEFAULT_RATE_PER_HOUR }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSettings {
    pub interval_secs: u64,
    #[serde(default = "enabled")]
    pub complete_finished: bool,
}

fn enabled() -> bool {
    true
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self { interval_secs: 30, complete_finished: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub wal_path: PathBuf,
    pub catalog_path: PathBuf,
    pub compact_threshold: u64,
    pub compact_interval_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            wal_path: PathBuf::from("./data/bookings.wal"),
            catalog_path: PathBuf::from("./config/catalog.json"),
            compact_threshold: 1000,
            compact_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HoldBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoldSettings {
    pub backend: HoldBackend,
    pub redis_url: String,
}

impl Default for HoldSettings {
    fn default() -> Self {
        Self { backend: HoldBackend::Memory, redis_url: "redis://127.0.0.1/".into() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    pub port: Option<u16>,
}

impl Settings {
    /// Layers, later wins: `config/default`, `config/{RUN_MODE}`,
    /// `config/local`, then `COURTBOOK__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("COURTBOOK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
