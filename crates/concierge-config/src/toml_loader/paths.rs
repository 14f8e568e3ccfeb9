//! Where the config file lives and how a missing one is seeded.

use concierge_common::ConfigError;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::template::default_config_toml;

/// Environment variable that points the gateway at a config file.
pub const CONFIG_PATH_ENV: &str = "CONCIERGE_CONFIG";

/// Resolve the config path: `CONCIERGE_CONFIG` when set and non-empty,
/// otherwise `<platform config dir>/concierge/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV))
}

pub(crate) fn resolve_config_path(overridden: Option<OsString>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = overridden.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("concierge").join("config.toml"))
}

/// Write the documented template at `path` unless a file is already there.
///
/// Returns `true` if the template was written. Two gateways starting at
/// once never clobber each other or an operator's edits.
pub fn ensure_config_exists(path: &Path) -> Result<bool, ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to create {}: {e}",
                path.display()
            )))
        }
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(|e| ConfigError::ParseError(format!("failed to write {}: {e}", path.display())))?;

    info!("seeded default config at {}", path.display());
    Ok(true)
}
