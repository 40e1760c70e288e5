//! Application settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings stored in `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Preferred IPC port on 127.0.0.1 (0 picks an ephemeral port)
    pub ipc_port: u16,

    /// How long a secondary waits to connect to the primary
    #[serde(with = "secs_serde")]
    pub connect_timeout: Duration,

    /// How long a secondary waits for the primary's response line
    #[serde(with = "secs_serde")]
    pub response_timeout: Duration,

    /// How long the primary waits for a client to send its command
    #[serde(with = "secs_serde")]
    pub read_timeout: Duration,

    /// Interval between presence refreshes while connected
    #[serde(with = "secs_serde")]
    pub keepalive_interval: Duration,

    /// Connect a profile automatically when a resident instance starts
    pub auto_connect: bool,

    /// Profile used for auto-connect
    pub auto_connect_profile: Option<String>,

    /// Last profile connected or selected
    pub last_profile: Option<String>,

    /// Default log filter when neither RUST_LOG nor -v is given
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ipc_port: 0,
            connect_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(10),
            auto_connect: false,
            auto_connect_profile: None,
            last_profile: None,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Configured IPC port, `None` when an ephemeral port should be used
    pub fn preferred_port(&self) -> Option<u16> {
        (self.ipc_port != 0).then_some(self.ipc_port)
    }
}

// Durations are stored as whole seconds
mod secs_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings = toml::from_str("auto_connect = true\nresponse_timeout = 9").unwrap();
        assert!(settings.auto_connect);
        assert_eq!(settings.response_timeout, Duration::from_secs(9));
        assert_eq!(settings.read_timeout, Duration::from_secs(2));
        assert_eq!(settings.preferred_port(), None);
    }

    #[test]
    fn test_preferred_port() {
        let settings = Settings {
            ipc_port: 45000,
            ..Settings::default()
        };
        assert_eq!(settings.preferred_port(), Some(45000));
    }
}
