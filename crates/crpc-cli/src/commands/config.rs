//! Config command implementations

use anyhow::{Context, Result};

use crate::output::{print_info, print_warning};
use crpc_core::config::load_settings;
use crpc_core::AppPaths;

/// Show the effective settings
///
/// Unlike a resident instance, which falls back to defaults, a malformed
/// file is an error here so it can be fixed.
pub fn config_show(paths: &AppPaths) -> Result<()> {
    let path = paths.settings_file();

    let settings =
        load_settings(&path).with_context(|| format!("Failed to load config from {:?}", path))?;
    if path.is_file() {
        print_info(&format!("Config file: {:?}", path));
    } else {
        print_warning(&format!("No config file at {:?}, showing defaults", path));
    }

    let content =
        toml::to_string_pretty(&settings).context("Failed to serialize settings")?;
    println!();
    println!("{}", content);
    Ok(())
}

/// Print the configuration directory
pub fn config_path(paths: &AppPaths) -> Result<()> {
    println!("{}", paths.config_dir().display());
    Ok(())
}
