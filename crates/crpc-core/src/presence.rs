//! Presence abstractions
//!
//! [`Activity`] is the library-independent shape of what gets published;
//! [`PresenceClient`] is implemented by the real chat-client adapter in
//! `crpc-host` and by test doubles.

use crate::error::PresenceError;
use crate::profile::{Button, Profile};
use crate::validate::MAX_BUTTONS;

/// Activity pushed to the chat client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    pub details: Option<String>,
    pub state: Option<String>,
    /// Unix seconds
    pub start_timestamp: Option<i64>,
    /// Unix seconds
    pub end_timestamp: Option<i64>,
    pub large_image_key: Option<String>,
    pub large_image_text: Option<String>,
    pub small_image_key: Option<String>,
    pub small_image_text: Option<String>,
    /// `(current, max)`, only when both are positive
    pub party: Option<(i32, i32)>,
    pub buttons: Vec<Button>,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl Activity {
    /// Build the activity for a profile
    ///
    /// The profile's `instance` flag has no field in the presence client and
    /// is not published.
    pub fn from_profile(profile: &Profile) -> Self {
        let party = match (profile.party_size, profile.party_max) {
            (Some(size), Some(max)) if size > 0 && max > 0 => Some((size, max)),
            _ => None,
        };

        Self {
            // The activity name is fixed by the application ID, so it only
            // shows up as details when nothing else is set
            details: non_empty(&profile.details).or_else(|| non_empty(&profile.activity_name)),
            state: non_empty(&profile.state),
            start_timestamp: profile.start_timestamp,
            end_timestamp: profile.end_timestamp,
            large_image_key: non_empty(&profile.large_image_key),
            large_image_text: non_empty(&profile.large_image_text),
            small_image_key: non_empty(&profile.small_image_key),
            small_image_text: non_empty(&profile.small_image_text),
            party,
            buttons: profile
                .buttons
                .iter()
                .filter(|b| !b.label.trim().is_empty() && !b.url.trim().is_empty())
                .take(MAX_BUTTONS)
                .cloned()
                .collect(),
        }
    }
}

/// Connection to the chat client's local presence endpoint
///
/// Implementations do blocking I/O; async callers go through
/// `spawn_blocking`.
pub trait PresenceClient: Send {
    /// Connect under `app_id`
    ///
    /// Connecting with the app ID already in use is a no-op; a different ID
    /// closes the existing connection first.
    fn connect(&mut self, app_id: &str) -> Result<(), PresenceError>;

    /// Replace the published activity
    fn update(&mut self, activity: &Activity) -> Result<(), PresenceError>;

    /// Clear the published activity, keeping the connection
    fn clear(&mut self) -> Result<(), PresenceError>;

    /// Close the connection; closing while disconnected succeeds
    fn close(&mut self) -> Result<(), PresenceError>;

    fn is_connected(&self) -> bool;

    /// App ID of the current connection
    fn app_id(&self) -> Option<&str>;
}
