//! Concierge configuration system.
//!
//! TOML-based configuration for the voice gateway and the live-session
//! core. All sections use defaults so a partial (or missing) config file
//! works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use concierge_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BackendConfig, ConciergeConfig, EngineConfig, GatewayConfig, LiveConfig, LogLevel,
    LoggingConfig, ToolsConfig, CONFIG_SCHEMA_VERSION,
};

use concierge_common::ConfigError;
use std::path::Path;

/// Load config from `CONCIERGE_CONFIG` or the platform default path and
/// validate it.
pub fn load_config() -> Result<ConciergeConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path (e.g. `--config`) and validate it.
pub fn load_config_from(path: &Path) -> Result<ConciergeConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &ConciergeConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
