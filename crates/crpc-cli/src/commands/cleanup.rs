//! Cleanup command implementation
//!
//! Manual recovery for when an instance was killed without releasing its
//! lock and port files, or hangs and has to be stopped.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use crpc_core::instance::{
    is_process_alive, read_lock_file, read_port_file, remove_file_if_exists, terminate_process,
    Termination,
};
use crpc_core::{AppPaths, IpcCommand, Settings};
use crpc_host::ipc::IpcClient;

/// Stop the recorded instance and delete the lock and port files
///
/// The instance is first asked to quit over IPC. If it does not exit within
/// `timeout` it is sent SIGTERM, then SIGKILL.
pub async fn cleanup_command(paths: &AppPaths, settings: &Settings, timeout: Duration) -> Result<()> {
    let lock_path = paths.lock_file();
    let port_path = paths.port_file();

    let pid = match read_lock_file(&lock_path) {
        Ok(pid) => pid,
        Err(e) => {
            print_warning(&format!("Lock file {:?} is unreadable: {}", lock_path, e));
            None
        }
    };
    let port = read_port_file(&port_path).ok().flatten();

    match pid {
        None => print_info("No instance recorded"),
        Some(pid) if pid == std::process::id() => {}
        Some(pid) if !is_process_alive(pid) => {
            print_info(&format!("Recorded instance {} is not running", pid));
        }
        Some(pid) => stop_instance(pid, port, settings, timeout).await?,
    }

    for path in [&port_path, &lock_path] {
        remove_file_if_exists(path).with_context(|| format!("Failed to remove {:?}", path))?;
    }
    print_success(&format!(
        "Removed lock and port files in {:?}",
        paths.config_dir()
    ));
    Ok(())
}

async fn stop_instance(
    pid: u32,
    port: Option<u16>,
    settings: &Settings,
    timeout: Duration,
) -> Result<()> {
    if let Some(port) = port {
        let client =
            IpcClient::new(port).with_timeouts(settings.connect_timeout, settings.response_timeout);
        match client.send(&IpcCommand::Quit).await {
            Ok(response) if response.is_success() => {
                if wait_for_exit(pid, timeout).await {
                    print_success(&format!("Instance {} quit", pid));
                    return Ok(());
                }
                print_warning(&format!("Instance {} accepted quit but is still running", pid));
            }
            Ok(response) => tracing::debug!("Quit rejected: {}", response),
            Err(e) if e.is_refused() => {
                // Nothing listens on the recorded port, so the PID now
                // belongs to some unrelated process
                print_warning(&format!(
                    "Process {} is not a CustomRPC instance, leaving it alone",
                    pid
                ));
                return Ok(());
            }
            Err(e) => tracing::debug!("Quit over IPC failed: {}", e),
        }
    }

    print_info(&format!("Stopping instance {}...", pid));
    let termination = tokio::task::spawn_blocking(move || terminate_process(pid, timeout))
        .await
        .context("Termination task failed")?
        .with_context(|| format!("Failed to signal process {}", pid))?;

    match termination {
        Termination::NotRunning | Termination::Graceful => {
            print_success(&format!("Instance {} stopped", pid));
        }
        Termination::Forced => {
            print_warning(&format!(
                "Instance {} ignored the stop request and was killed",
                pid
            ));
        }
        Termination::Survived => {
            print_error(&format!("Instance {} is still running", pid));
            anyhow::bail!("Failed to stop instance {}", pid);
        }
    }
    Ok(())
}

/// Poll until `pid` exits or `timeout` passes
async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !is_process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    !is_process_alive(pid)
}
