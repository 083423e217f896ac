// Configuration loader
// Loads queue settings from $LANE_QUEUE_CONFIG or <config dir>/lane-queue/config.toml

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::CONFIG_PATH_ENV;
use super::settings::QueueConfig;

/// Default config file location, if a config directory exists on this platform.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lane-queue").join("config.toml"))
}

/// Load configuration from the environment override or the default path.
///
/// A missing file is not an error: the defaults are returned.
pub fn load_config() -> Result<QueueConfig> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return load_config_from(Path::new(&path));
        }
    }

    match default_config_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => {
            tracing::debug!("No queue config file found, using defaults");
            Ok(QueueConfig::default())
        }
    }
}

/// Load and validate configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<QueueConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read queue config {}", path.display()))?;

    QueueConfig::from_toml_str(&contents)
        .with_context(|| format!("Invalid queue config {}", path.display()))
}
