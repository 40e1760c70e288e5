//! Profile command implementations
//!
//! These work on the profile files directly and never talk to a running
//! instance, which rereads the store on every command anyway.

use std::path::Path;

use anyhow::{Context, Result};

use crate::output::{format_profile, format_profiles, print_success, print_warning};
use crpc_core::time::current_time_millis;
use crpc_core::{AppPaths, ProfileStore};

fn open_store(paths: &AppPaths) -> Result<ProfileStore> {
    ProfileStore::open(paths.profiles_dir()).with_context(|| {
        format!(
            "Failed to open profile store at {:?}",
            paths.profiles_dir()
        )
    })
}

/// List all profiles as a table
pub fn profile_list(paths: &AppPaths) -> Result<()> {
    let store = open_store(paths)?;

    let mut profiles = Vec::new();
    for name in store.list()? {
        match store.load(&name) {
            Ok(profile) => profiles.push(profile),
            Err(e) => print_warning(&format!("Skipping profile '{}': {}", name, e)),
        }
    }

    println!("{}", format_profiles(&profiles, current_time_millis()));
    Ok(())
}

/// Show one profile, as labelled lines or as its JSON file content
pub fn profile_show(paths: &AppPaths, name: &str, json: bool) -> Result<()> {
    let profile = open_store(paths)?.load(name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print!("{}", format_profile(&profile));
    }
    Ok(())
}

pub fn profile_import(paths: &AppPaths, file: &Path, name: Option<&str>) -> Result<()> {
    let profile = open_store(paths)?
        .import(file, name)
        .with_context(|| format!("Failed to import {:?}", file))?;
    print_success(&format!("Imported profile '{}'", profile.name));
    Ok(())
}

pub fn profile_export(paths: &AppPaths, name: &str, file: &Path) -> Result<()> {
    open_store(paths)?.export(name, file)?;
    print_success(&format!("Exported profile '{}' to {:?}", name, file));
    Ok(())
}

pub fn profile_delete(paths: &AppPaths, name: &str) -> Result<()> {
    open_store(paths)?.delete(name)?;
    print_success(&format!("Deleted profile '{}'", name));
    Ok(())
}

pub fn profile_rename(paths: &AppPaths, old_name: &str, new_name: &str) -> Result<()> {
    let profile = open_store(paths)?.rename(old_name, new_name)?;
    print_success(&format!("Renamed '{}' to '{}'", old_name, profile.name));
    Ok(())
}

pub fn profile_duplicate(paths: &AppPaths, source: &str, new_name: &str) -> Result<()> {
    let profile = open_store(paths)?.duplicate(source, new_name)?;
    print_success(&format!("Duplicated '{}' as '{}'", source, profile.name));
    Ok(())
}

/// Print the profiles directory
pub fn profile_path(paths: &AppPaths) -> Result<()> {
    println!("{}", paths.profiles_dir().display());
    Ok(())
}
