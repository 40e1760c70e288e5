//! Configuration management for CustomRPC

mod paths;
mod settings;

pub use paths::{AppPaths, LOCK_FILE_NAME, LOG_FILE_NAME, PORT_FILE_NAME, SETTINGS_FILE_NAME};
pub use settings::Settings;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Directory name under the platform config directory
pub const APP_DIR_NAME: &str = "CustomRPCManager";

/// Get the default configuration directory
///
/// `~/.config/CustomRPCManager` on Linux, `~/Library/Application Support/CustomRPCManager`
/// on macOS and `%APPDATA%\CustomRPCManager` on Windows.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Load settings; a missing file means defaults
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    match load_config::<Settings>(path) {
        Err(ConfigError::NotFound(_)) => Ok(Settings::default()),
        other => other,
    }
}
