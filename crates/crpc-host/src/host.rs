//! Primary instance run loop

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crpc_core::Settings;

use crate::coordinator::PrimaryInstance;
use crate::ipc::IpcServer;
use crate::keepalive::Keepalive;
use crate::state::SharedState;

/// Timing knobs for a resident primary
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub read_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl From<&Settings> for HostOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            read_timeout: settings.read_timeout,
            keepalive_interval: settings.keepalive_interval,
        }
    }
}

impl Default for HostOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Serve IPC commands until `shutdown` is cancelled, then clean up
///
/// Cleanup disconnects presence and removes the lock and port files.
pub async fn run_primary(
    mut primary: PrimaryInstance,
    state: SharedState,
    options: HostOptions,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = primary
        .take_listener()
        .context("IPC listener was already taken")?;

    let keepalive =
        Keepalive::new(options.keepalive_interval).spawn(Arc::clone(&state), shutdown.clone());

    let server = IpcServer::new(Arc::clone(&state), shutdown.clone())
        .with_read_timeout(options.read_timeout);
    let served = server.run(listener).await;

    shutdown.cancel();
    if let Err(e) = keepalive.await {
        tracing::warn!("Keepalive task ended abnormally: {}", e);
    }

    let disconnect = tokio::task::spawn_blocking(move || state.lock().disconnect()).await;
    match disconnect {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to disconnect presence on shutdown: {}", e),
        Err(e) => tracing::warn!("Disconnect task failed: {}", e),
    }

    primary
        .release()
        .context("Failed to release instance lock")?;
    tracing::info!("Primary instance stopped");
    served
}
