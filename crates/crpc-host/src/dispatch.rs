//! Command dispatcher
//!
//! Applies one [`IpcCommand`] to the host state and produces the single
//! response line sent back to the caller. Every failure becomes an `ERROR:`
//! response; nothing here can stop the primary except `quit`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crpc_core::validate::validate_profile;
use crpc_core::{Activity, IpcCommand, IpcResponse};

use crate::state::{ConnectedProfile, HostState, SharedState};

/// Apply a command to the host state
///
/// Blocks on presence I/O; async callers use [`dispatch_shared`].
pub fn dispatch(
    state: &mut HostState,
    command: IpcCommand,
    shutdown: &CancellationToken,
) -> IpcResponse {
    tracing::debug!("Dispatching '{}'", command);

    match command {
        IpcCommand::Connect { profile: Some(name) } => connect(state, &name),
        IpcCommand::Connect { profile: None } => match state.last_profile().map(str::to_string) {
            Some(name) => connect(state, &name),
            None => IpcResponse::error("no profile specified and no last profile"),
        },
        IpcCommand::Select { profile } => select(state, &profile),
        IpcCommand::Disconnect => match state.disconnect() {
            Ok(()) => IpcResponse::ok("disconnected"),
            Err(e) => IpcResponse::error(e.to_string()),
        },
        IpcCommand::ListProfiles => match state.profiles.list() {
            Ok(names) => IpcResponse::Profiles { names },
            Err(e) => IpcResponse::error(e.to_string()),
        },
        IpcCommand::Status => match state.connected() {
            Some(profile) => {
                IpcResponse::ok(format!("connected {} (pid {})", profile.name, state.pid()))
            }
            None => IpcResponse::ok(format!("idle (pid {})", state.pid())),
        },
        IpcCommand::Ping => IpcResponse::ok("pong"),
        IpcCommand::Quit => {
            if let Err(e) = state.disconnect() {
                tracing::warn!("Disconnect during quit failed: {}", e);
            }
            tracing::info!("Quit requested, shutting down");
            shutdown.cancel();
            IpcResponse::ok("quitting")
        }
    }
}

/// Dispatch on the blocking pool against shared state
pub async fn dispatch_shared(
    state: &SharedState,
    command: IpcCommand,
    shutdown: &CancellationToken,
) -> IpcResponse {
    let state = Arc::clone(state);
    let shutdown = shutdown.clone();

    match tokio::task::spawn_blocking(move || dispatch(&mut state.lock(), command, &shutdown)).await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Command handler panicked: {}", e);
            IpcResponse::error("internal error")
        }
    }
}

fn connect(state: &mut HostState, name: &str) -> IpcResponse {
    let profile = match state.profiles.load(name) {
        Ok(profile) => profile,
        Err(e) => return IpcResponse::error(e.to_string()),
    };
    if let Err(errors) = validate_profile(&profile) {
        return IpcResponse::error(format!(
            "invalid profile '{}': {}",
            profile.name,
            errors.join("; ")
        ));
    }

    let activity = Activity::from_profile(&profile);
    let presence = state.presence_mut();
    let published = match presence.connect(&profile.app_id) {
        Ok(()) => presence.update(&activity),
        Err(e) => Err(e),
    };
    if let Err(e) = published {
        // The client may already be switched to the new application, so the
        // previous profile is no longer what it publishes
        if let Err(close) = state.disconnect() {
            tracing::debug!("Error closing presence after failed connect: {}", close);
        }
        return IpcResponse::error(e.to_string());
    }

    tracing::info!("Connected profile '{}'", profile.name);
    state.set_connected(ConnectedProfile {
        name: profile.name.clone(),
        app_id: profile.app_id,
        activity,
    });
    state.remember_last_profile(&profile.name);
    IpcResponse::ok(format!("connected {}", profile.name))
}

fn select(state: &mut HostState, name: &str) -> IpcResponse {
    match state.profiles.load(name) {
        Ok(profile) => {
            state.remember_last_profile(&profile.name);
            IpcResponse::ok(format!("selected {}", profile.name))
        }
        Err(e) => IpcResponse::error(e.to_string()),
    }
}
