//! Configuration file handling for uds-cli

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uds_client::UdsConfig;

/// Load `path`, or the default config file if present, or built-in defaults
pub fn load(path: Option<&Path>) -> Result<UdsConfig> {
    if let Some(path) = path {
        return UdsConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()));
    }

    match config_path() {
        Some(default) if default.exists() => UdsConfig::from_file(&default)
            .with_context(|| format!("Failed to load config file: {}", default.display())),
        _ => Ok(UdsConfig::default()),
    }
}

/// Default config file location (`~/.config/uds-cli/config.toml` on Linux)
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("uds-cli").join("config.toml"))
}
