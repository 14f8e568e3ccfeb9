//! Core TOML config loading: read from path or platform default.

use crate::schema::ConciergeConfig;
use crate::validation;
use concierge_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{default_config_path, ensure_config_exists};

/// Load config from a specific TOML file path.
///
/// Missing fields take their serde defaults. Validation problems are
/// logged here; callers that need a hard failure run
/// [`validation::validate`] themselves.
pub fn load_from_path(path: &Path) -> Result<ConciergeConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: ConciergeConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from `CONCIERGE_CONFIG` or the platform default path
/// (on Linux `~/.config/concierge/config.toml`).
///
/// A missing file is seeded with the documented template and then loaded.
pub fn load_default() -> Result<ConciergeConfig, ConfigError> {
    load_or_seed(&default_config_path()?)
}

pub(crate) fn load_or_seed(path: &Path) -> Result<ConciergeConfig, ConfigError> {
    if ensure_config_exists(path)? {
        info!("no config found, using template at {}", path.display());
    }
    load_from_path(path)
}
