//! crpc-host: The CustomRPC primary instance
//!
//! Decides whether an invocation is the primary or a secondary, serves IPC
//! commands against the owned host state, and keeps the published presence
//! alive.

pub mod coordinator;
pub mod discord;
pub mod dispatch;
pub mod host;
pub mod ipc;
pub mod keepalive;
pub mod state;

pub use coordinator::{Coordinator, PrimaryInstance, Role};
pub use discord::DiscordPresence;
pub use dispatch::{dispatch, dispatch_shared};
pub use host::{run_primary, HostOptions};
pub use state::{HostState, SharedState};
