//! crpc-core: Core types and single-instance primitives for CustomRPC
//!
//! This crate provides the configuration layout, error types, lock/port file
//! primitives, IPC wire types, profile store and presence abstractions shared
//! by the host and the CLI.

pub mod config;
pub mod error;
pub mod instance;
pub mod ipc;
pub mod presence;
pub mod profile;
pub mod time;
pub mod validate;

pub use config::{AppPaths, Settings};
pub use error::{ConfigError, InstanceError, IpcError, PresenceError, ProfileError};
pub use ipc::{IpcCommand, IpcResponse};
pub use presence::{Activity, PresenceClient};
pub use profile::{Button, Profile, ProfileStore};
