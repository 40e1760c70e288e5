//! Discord Rich Presence adapter

use discord_rich_presence::activity::{self, Assets, Party, Timestamps};
use discord_rich_presence::{DiscordIpc, DiscordIpcClient};

use crpc_core::{Activity, PresenceClient, PresenceError};

/// [`PresenceClient`] backed by the local Discord IPC socket
#[derive(Default)]
pub struct DiscordPresence {
    client: Option<DiscordIpcClient>,
    app_id: Option<String>,
}

impl DiscordPresence {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_mut(&mut self) -> Result<&mut DiscordIpcClient, PresenceError> {
        self.client.as_mut().ok_or(PresenceError::NotConnected)
    }
}

impl PresenceClient for DiscordPresence {
    fn connect(&mut self, app_id: &str) -> Result<(), PresenceError> {
        if self.client.is_some() && self.app_id.as_deref() == Some(app_id) {
            return Ok(());
        }
        if self.client.is_some() {
            tracing::debug!("Switching application ID, closing current connection");
            self.close()?;
        }

        let mut client =
            DiscordIpcClient::new(app_id).map_err(|e| PresenceError::Connect(e.to_string()))?;
        client
            .connect()
            .map_err(|e| PresenceError::Connect(e.to_string()))?;

        tracing::info!("Connected to Discord with application {}", app_id);
        self.client = Some(client);
        self.app_id = Some(app_id.to_string());
        Ok(())
    }

    fn update(&mut self, activity: &Activity) -> Result<(), PresenceError> {
        let mut payload = activity::Activity::new();

        if let Some(details) = &activity.details {
            payload = payload.details(details);
        }
        if let Some(state) = &activity.state {
            payload = payload.state(state);
        }

        if activity.start_timestamp.is_some() || activity.end_timestamp.is_some() {
            let mut timestamps = Timestamps::new();
            if let Some(start) = activity.start_timestamp {
                timestamps = timestamps.start(start);
            }
            if let Some(end) = activity.end_timestamp {
                timestamps = timestamps.end(end);
            }
            payload = payload.timestamps(timestamps);
        }

        let mut assets = Assets::new();
        let mut has_assets = false;
        if let Some(key) = &activity.large_image_key {
            assets = assets.large_image(key);
            has_assets = true;
        }
        if let Some(text) = &activity.large_image_text {
            assets = assets.large_text(text);
            has_assets = true;
        }
        if let Some(key) = &activity.small_image_key {
            assets = assets.small_image(key);
            has_assets = true;
        }
        if let Some(text) = &activity.small_image_text {
            assets = assets.small_text(text);
            has_assets = true;
        }
        if has_assets {
            payload = payload.assets(assets);
        }

        if let Some((size, max)) = activity.party {
            payload = payload.party(Party::new().size([size, max]));
        }

        if !activity.buttons.is_empty() {
            payload = payload.buttons(
                activity
                    .buttons
                    .iter()
                    .map(|b| activity::Button::new(&b.label, &b.url))
                    .collect(),
            );
        }

        self.client_mut()?
            .set_activity(payload)
            .map_err(|e| PresenceError::Update(e.to_string()))
    }

    fn clear(&mut self) -> Result<(), PresenceError> {
        self.client_mut()?
            .clear_activity()
            .map_err(|e| PresenceError::Update(e.to_string()))
    }

    fn close(&mut self) -> Result<(), PresenceError> {
        self.app_id = None;
        match self.client.take() {
            Some(mut client) => client
                .close()
                .map_err(|e| PresenceError::Close(e.to_string())),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }
}

impl Drop for DiscordPresence {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("Error closing Discord connection on drop: {}", e);
        }
    }
}
