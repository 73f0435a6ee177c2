use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_CURRENCY_SCALE: u32 = 2;
const DEFAULT_MAX_WRITE_RETRIES: u32 = 5;
const DEFAULT_AUDIT_CHANNEL_CAPACITY: usize = 1024;
const CONFIG_DIR: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Engine configuration.
///
/// Loaded from an optional `config/costing.*` file layered under a
/// `COSTING_`-prefixed environment, or built with [`EngineConfig::default`]
/// when the host wires the engine directly.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Decimal places of the currency's minimal unit (2 for cents).
    #[serde(default = "default_currency_scale")]
    #[validate(range(min = 0, max = 12))]
    pub currency_scale: u32,

    /// Bounded retry budget for optimistic-concurrency conflicts.
    #[serde(default = "default_max_write_retries")]
    #[validate(range(min = 1, max = 64))]
    pub max_write_retries: u32,

    /// Capacity of the bounded audit event channel.
    #[serde(default = "default_audit_channel_capacity")]
    #[validate(range(min = 1))]
    pub audit_channel_capacity: usize,
}

fn default_currency_scale() -> u32 {
    DEFAULT_CURRENCY_SCALE
}

fn default_max_write_retries() -> u32 {
    DEFAULT_MAX_WRITE_RETRIES
}

fn default_audit_channel_capacity() -> usize {
    DEFAULT_AUDIT_CHANNEL_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency_scale: DEFAULT_CURRENCY_SCALE,
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
            audit_channel_capacity: DEFAULT_AUDIT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `config/costing.*` (optional) and the
    /// `COSTING_` environment, then validates ranges.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(File::with_name(&format!("{}/costing", CONFIG_DIR)).required(false))
            .add_source(Environment::with_prefix("COSTING").separator("__"))
            .build()?;

        let loaded: EngineConfig = config.try_deserialize()?;
        loaded.validate()?;
        info!(
            currency_scale = loaded.currency_scale,
            max_write_retries = loaded.max_write_retries,
            "engine configuration loaded"
        );
        Ok(loaded)
    }
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` wins when set. Safe to call more than once; later calls are
/// no-ops.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("costing_engine={}", level);
    let filter_directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}
