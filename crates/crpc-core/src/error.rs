//! Core error types for CustomRPC

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Lock/port file coordination errors
#[derive(Error, Debug)]
pub enum InstanceError {
    /// The recorded primary is gone; the pair is cleared automatically
    #[error("Stale lock left by process {pid:?}")]
    StaleLock { pid: Option<u32> },

    /// No port could be bound for the IPC listener
    #[error("Failed to bind IPC listener on port {port}: {source}")]
    PortBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Reading, writing or removing a lock/port file failed
    #[error("Failed to access {path:?}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A live primary exists but never published its IPC port
    #[error("Instance {pid} is running but its IPC port is unknown")]
    PrimaryUnreachable { pid: u32 },

    /// Gave up after repeatedly racing other starters for the lock
    #[error("Could not acquire the instance lock after {attempts} attempts")]
    LockContended { attempts: u32 },

    /// Talking to the primary failed
    #[error(transparent)]
    Ipc(#[from] IpcError),
}

/// IPC protocol and transport errors
#[derive(Error, Debug)]
pub enum IpcError {
    /// Empty or unparsable command line
    #[error("Malformed command: {0}")]
    Malformed(String),

    /// Syntactically fine but not a command we know
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// Could not connect to the primary
    #[error("Failed to connect to instance on port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Primary did not answer in time
    #[error("Instance on port {port} did not respond within {after:?}")]
    Timeout { port: u16, after: Duration },

    /// The response line did not follow the protocol
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IpcError {
    /// Connection actively refused: nothing listens on the recorded port
    pub fn is_refused(&self) -> bool {
        matches!(
            self,
            IpcError::Connect { source, .. } if source.kind() == std::io::ErrorKind::ConnectionRefused
        )
    }
}

/// Profile store errors
#[derive(Error, Debug)]
pub enum ProfileError {
    /// Profile not found
    #[error("Profile '{0}' not found")]
    NotFound(String),

    /// Profile already exists
    #[error("Profile '{0}' already exists")]
    AlreadyExists(String),

    /// Profile data failed validation
    #[error("Invalid profile: {0}")]
    Invalid(String),

    /// JSON error
    #[error("JSON error in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Presence client errors
#[derive(Error, Debug)]
pub enum PresenceError {
    /// Could not reach the chat client
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// Operation requires a connection
    #[error("Not connected")]
    NotConnected,

    /// Activity update rejected or failed
    #[error("Failed to update activity: {0}")]
    Update(String),

    /// Closing the connection failed
    #[error("Failed to close connection: {0}")]
    Close(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
