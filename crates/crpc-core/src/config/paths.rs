//! On-disk layout of the configuration directory

use std::path::{Path, PathBuf};

/// Lock file name (records the primary's PID)
pub const LOCK_FILE_NAME: &str = ".lock";
/// Port file name (records the primary's IPC port)
pub const PORT_FILE_NAME: &str = ".port";
/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "config.toml";
/// Log file prefix inside `logs/`
pub const LOG_FILE_NAME: &str = "customrpc.log";

/// Every path the application reads or writes, rooted at one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// Paths rooted at an explicit directory
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Paths rooted at the platform default directory
    pub fn platform_default() -> Self {
        Self::at(super::default_config_dir())
    }

    /// Root configuration directory
    pub fn config_dir(&self) -> &Path {
        &self.root
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    pub fn port_file(&self) -> PathBuf {
        self.root.join(PORT_FILE_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE_NAME)
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the root, profiles and logs directories
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.profiles_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::platform_default()
    }
}
