//! TOML config file loading and creation.

mod loader;
mod paths;
mod template;


pub use loader::{load_default, load_from_path};
pub use paths::{default_config_path, ensure_config_exists, CONFIG_PATH_ENV};
