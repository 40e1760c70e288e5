//! IPC between secondary invocations and the primary instance
//!
//! Wire types live in `crpc_core::ipc`; this module holds the TCP server and
//! client.

mod client;
mod server;

pub use client::IpcClient;
pub use server::IpcServer;
