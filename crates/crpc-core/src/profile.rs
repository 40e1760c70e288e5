//! Presence profiles and their on-disk store
//!
//! Each profile is a pretty-printed JSON file in the profiles directory,
//! named after a filesystem-safe form of the profile name. The store never
//! caches: every call goes to disk, so a long-running instance always sees
//! profiles created or edited by other processes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::time::current_time_millis;

/// A clickable button shown under the activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub url: String,
}

/// Named set of presence fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Display name, also the lookup key
    pub name: String,
    /// Application ID the presence is published under
    pub app_id: String,
    /// Activity name override
    #[serde(alias = "activity")]
    pub activity_name: String,
    pub details: String,
    pub state: String,
    /// Unix seconds
    pub start_timestamp: Option<i64>,
    /// Unix seconds
    pub end_timestamp: Option<i64>,
    pub large_image_key: String,
    pub large_image_text: String,
    pub small_image_key: String,
    pub small_image_text: String,
    pub party_size: Option<i32>,
    pub party_max: Option<i32>,
    pub buttons: Vec<Button>,
    /// Whether the activity is a game instance
    pub instance: Option<bool>,
    /// Unix milliseconds
    pub created_at: u64,
    /// Unix milliseconds
    pub updated_at: u64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            app_id: String::new(),
            activity_name: String::new(),
            details: String::new(),
            state: String::new(),
            start_timestamp: None,
            end_timestamp: None,
            large_image_key: String::new(),
            large_image_text: String::new(),
            small_image_key: String::new(),
            small_image_text: String::new(),
            party_size: None,
            party_max: None,
            buttons: Vec::new(),
            instance: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}

impl Profile {
    /// Empty profile with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Keep alphanumerics, space, `-` and `_`, trimmed
pub fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Directory-backed profile store
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Open a store rooted at `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the profile files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a profile name
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_file_stem(name)))
    }

    /// Whether a profile with this name exists
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// List profile names, sorted
    ///
    /// Files that can't be parsed are skipped with a warning.
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match read_profile(&path) {
                Ok(profile) if !profile.name.is_empty() => names.push(profile.name),
                Ok(_) => {
                    // Fall back to the file stem, as older files may lack a name
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable profile {:?}: {}", path, e);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load a profile by name
    pub fn load(&self, name: &str) -> Result<Profile, ProfileError> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(ProfileError::NotFound(name.to_string()));
        }

        let mut profile = read_profile(&path)?;
        if profile.name.is_empty() {
            profile.name = name.to_string();
        }
        tracing::debug!("Loaded profile '{}'", name);
        Ok(profile)
    }

    /// Create a new profile; fails if one with the same name exists
    pub fn create(&self, mut profile: Profile) -> Result<Profile, ProfileError> {
        crate::validate::validate_profile_name(&profile.name).map_err(ProfileError::Invalid)?;
        profile.name = profile.name.trim().to_string();

        if self.exists(&profile.name) {
            return Err(ProfileError::AlreadyExists(profile.name));
        }
        let path = self.path_for(&profile.name);

        let now = current_time_millis();
        profile.created_at = now;
        profile.updated_at = now;
        write_profile(&path, &profile)?;

        tracing::info!("Created profile '{}'", profile.name);
        Ok(profile)
    }

    /// Overwrite an existing profile, keeping its creation time
    pub fn update(&self, mut profile: Profile) -> Result<Profile, ProfileError> {
        let existing = self.load(&profile.name)?;
        profile.created_at = existing.created_at;
        profile.updated_at = current_time_millis();
        write_profile(&self.path_for(&profile.name), &profile)?;

        tracing::info!("Updated profile '{}'", profile.name);
        Ok(profile)
    }

    /// Delete a profile
    pub fn delete(&self, name: &str) -> Result<(), ProfileError> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Deleted profile '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ProfileError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rename a profile
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<Profile, ProfileError> {
        crate::validate::validate_profile_name(new_name).map_err(ProfileError::Invalid)?;
        let new_name = new_name.trim();

        let old_path = self.path_for(old_name);
        let new_path = self.path_for(new_name);
        let mut profile = self.load(old_name)?;

        if new_path.exists() && new_path != old_path {
            return Err(ProfileError::AlreadyExists(new_name.to_string()));
        }

        profile.name = new_name.to_string();
        profile.updated_at = current_time_millis();
        write_profile(&new_path, &profile)?;
        if new_path != old_path {
            fs::remove_file(&old_path)?;
        }

        tracing::info!("Renamed profile '{}' to '{}'", old_name, new_name);
        Ok(profile)
    }

    /// Copy a profile under a new name
    pub fn duplicate(&self, source: &str, new_name: &str) -> Result<Profile, ProfileError> {
        let mut profile = self.load(source)?;
        profile.name = new_name.to_string();
        self.create(profile)
    }

    /// Write a profile to an arbitrary file
    pub fn export(&self, name: &str, dest: &Path) -> Result<(), ProfileError> {
        let profile = self.load(name)?;
        write_profile(dest, &profile)?;
        tracing::info!("Exported profile '{}' to {:?}", name, dest);
        Ok(())
    }

    /// Import a profile from a file, optionally under a different name
    pub fn import(&self, source: &Path, name: Option<&str>) -> Result<Profile, ProfileError> {
        let mut profile = read_profile(source)?;

        profile.name = match name {
            Some(n) => n.to_string(),
            None if !profile.name.is_empty() => profile.name,
            None => source
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
        };

        self.create(profile)
    }
}

fn read_profile(path: &Path) -> Result<Profile, ProfileError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| ProfileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_profile(path: &Path, profile: &Profile) -> Result<(), ProfileError> {
    let json = serde_json::to_string_pretty(profile).map_err(|source| ProfileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    Ok(())
}
