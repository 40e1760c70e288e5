//! custom-rpc: Command-line interface for CustomRPC
//!
//! Provides the `custom-rpc` binary: instance-control flags that either start
//! the resident primary or forward one command to it, plus local profile,
//! config and cleanup commands.

pub mod commands;
pub mod output;
