//! Shared fixtures for host integration tests

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crpc_core::{Activity, AppPaths, PresenceClient, PresenceError, Profile, ProfileStore};
use crpc_host::{HostState, SharedState};

pub const APP_ID: &str = "123456789012345678";

/// Everything a [`RecordingPresence`] was asked to do
#[derive(Debug, Default)]
pub struct Recorded {
    pub connects: Vec<String>,
    pub activities: Vec<Activity>,
    pub closes: usize,
}

/// Presence double that records calls instead of talking to a chat client
pub struct RecordingPresence {
    recorded: Arc<Mutex<Recorded>>,
    app_id: Option<String>,
}

impl RecordingPresence {
    pub fn new() -> (Self, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let presence = Self {
            recorded: Arc::clone(&recorded),
            app_id: None,
        };
        (presence, recorded)
    }
}

impl PresenceClient for RecordingPresence {
    fn connect(&mut self, app_id: &str) -> Result<(), PresenceError> {
        if self.app_id.as_deref() == Some(app_id) {
            return Ok(());
        }
        self.recorded.lock().connects.push(app_id.to_string());
        self.app_id = Some(app_id.to_string());
        Ok(())
    }

    fn update(&mut self, activity: &Activity) -> Result<(), PresenceError> {
        if self.app_id.is_none() {
            return Err(PresenceError::NotConnected);
        }
        self.recorded.lock().activities.push(activity.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PresenceError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), PresenceError> {
        if self.app_id.take().is_some() {
            self.recorded.lock().closes += 1;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.app_id.is_some()
    }

    fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }
}

/// A config directory with two profiles and a host state over it
pub struct Fixture {
    pub dir: TempDir,
    pub paths: AppPaths,
    pub state: SharedState,
    pub recorded: Arc<Mutex<Recorded>>,
}

pub fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let paths = AppPaths::at(dir.path());
    paths.ensure_dirs().unwrap();

    let store = ProfileStore::open(paths.profiles_dir()).unwrap();
    store
        .create(Profile {
            app_id: APP_ID.to_string(),
            details: "Ranked".to_string(),
            state: "In queue".to_string(),
            ..Profile::new("Gaming")
        })
        .unwrap();
    store
        .create(Profile {
            app_id: "876543210987654321".to_string(),
            details: "Writing Rust".to_string(),
            ..Profile::new("Late Night Coding")
        })
        .unwrap();

    let (presence, recorded) = RecordingPresence::new();
    let state = HostState::new(store, Box::new(presence)).into_shared();

    Fixture {
        dir,
        paths,
        state,
        recorded,
    }
}
