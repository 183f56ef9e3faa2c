//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration. Poll notifications are dropped when absent.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Periodic task configuration.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Prefix for pub/sub channel names.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

/// Intervals and limits for the lifecycle and aggregation tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// Whether the periodic tasks run in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between lifecycle passes.
    #[serde(default = "default_lifecycle_interval")]
    pub lifecycle_interval_secs: u64,
    /// Seconds between statistics aggregation passes.
    #[serde(default = "default_aggregation_interval")]
    pub aggregation_interval_secs: u64,
    /// Upper bound for a single store call.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            lifecycle_interval_secs: default_lifecycle_interval(),
            aggregation_interval_secs: default_aggregation_interval(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_channel_prefix() -> String {
    "tally".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_lifecycle_interval() -> u64 {
    30
}

const fn default_aggregation_interval() -> u64 {
    60
}

const fn default_store_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `TALLY_ENV`)
    /// 3. Environment variables with `TALLY__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("TALLY_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
