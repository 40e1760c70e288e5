//! Host state owned by the primary instance

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crpc_core::config::{load_settings, save_config};
use crpc_core::{Activity, PresenceClient, PresenceError, ProfileStore, Settings};

/// State shared between the IPC server and the keepalive task
pub type SharedState = Arc<Mutex<HostState>>;

/// Profile currently published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedProfile {
    pub name: String,
    pub app_id: String,
    pub activity: Activity,
}

/// Everything a command can read or change
///
/// The dispatcher is the only writer; the keepalive task re-sends the
/// connected activity through the same lock.
pub struct HostState {
    /// Profile store; always read from disk
    pub profiles: ProfileStore,
    presence: Box<dyn PresenceClient>,
    connected: Option<ConnectedProfile>,
    last_profile: Option<String>,
    /// Where `last_profile` is persisted, if anywhere
    settings_path: Option<PathBuf>,
    pid: u32,
}

impl HostState {
    /// Create state for this process
    pub fn new(profiles: ProfileStore, presence: Box<dyn PresenceClient>) -> Self {
        Self {
            profiles,
            presence,
            connected: None,
            last_profile: None,
            settings_path: None,
            pid: std::process::id(),
        }
    }

    /// Persist the last used profile to a settings file and start from the
    /// value already stored there
    pub fn with_settings(mut self, path: impl Into<PathBuf>, settings: &Settings) -> Self {
        self.settings_path = Some(path.into());
        self.last_profile = settings.last_profile.clone();
        self
    }

    /// Wrap into the shared handle used by the server
    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Profile currently published, if any
    pub fn connected(&self) -> Option<&ConnectedProfile> {
        self.connected.as_ref()
    }

    pub fn last_profile(&self) -> Option<&str> {
        self.last_profile.as_deref()
    }

    pub fn presence_mut(&mut self) -> &mut dyn PresenceClient {
        self.presence.as_mut()
    }

    pub(crate) fn set_connected(&mut self, profile: ConnectedProfile) {
        self.connected = Some(profile);
    }

    /// Remember a profile as the last one used and persist it
    ///
    /// A settings file that can't be parsed is left untouched.
    pub(crate) fn remember_last_profile(&mut self, name: &str) {
        self.last_profile = Some(name.to_string());

        let Some(path) = &self.settings_path else {
            return;
        };
        let mut settings = match load_settings(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Not saving last profile, settings unreadable: {}", e);
                return;
            }
        };
        settings.last_profile = Some(name.to_string());
        if let Err(e) = save_config(path, &settings) {
            tracing::warn!("Failed to save last profile: {}", e);
        }
    }

    /// Clear and close the presence connection
    ///
    /// Succeeds when already disconnected. The connection is considered gone
    /// even if closing reports an error.
    pub fn disconnect(&mut self) -> Result<(), PresenceError> {
        let previous = self.connected.take();

        if !self.presence.is_connected() {
            return Ok(());
        }
        if let Err(e) = self.presence.clear() {
            tracing::debug!("Failed to clear activity before closing: {}", e);
        }
        self.presence.close()?;

        if let Some(profile) = previous {
            tracing::info!("Disconnected profile '{}'", profile.name);
        }
        Ok(())
    }
}
