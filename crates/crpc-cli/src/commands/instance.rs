//! Instance control: start the resident primary or forward to it

use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::output::{print_info, print_response};
use crpc_core::ipc::ipc_address;
use crpc_core::{AppPaths, IpcCommand, ProfileStore, Settings};
use crpc_host::{
    dispatch_shared, run_primary, Coordinator, DiscordPresence, HostOptions, HostState,
    PrimaryInstance, Role, SharedState,
};

/// Instance-control flags as given on the command line
#[derive(Debug, Clone, Default)]
pub struct InstanceFlags {
    pub profile: Option<String>,
    pub connect: bool,
    pub disconnect: bool,
    pub list_profiles: bool,
    pub quit: bool,
    pub status: bool,
}

impl InstanceFlags {
    /// The IPC command these flags ask for, `None` for a plain launch
    pub fn to_command(&self) -> Option<IpcCommand> {
        if self.connect {
            return Some(IpcCommand::Connect {
                profile: self.profile.clone(),
            });
        }
        if self.disconnect {
            return Some(IpcCommand::Disconnect);
        }
        if self.list_profiles {
            return Some(IpcCommand::ListProfiles);
        }
        if self.quit {
            return Some(IpcCommand::Quit);
        }
        if self.status {
            return Some(IpcCommand::Status);
        }
        self.profile
            .clone()
            .map(|profile| IpcCommand::Select { profile })
    }
}

/// How an instance-control invocation should behave
#[derive(Debug, Clone, Default)]
pub struct InstanceOptions {
    /// Command to run, `None` for a plain launch
    pub command: Option<IpcCommand>,
    /// Exit after the command instead of staying resident
    pub once: bool,
    /// Start without the startup banner
    pub minimized: bool,
    pub quiet: bool,
}

/// Run one invocation of the instance-control surface
///
/// With no primary running this process becomes the primary, runs the
/// command in-process and stays resident. Otherwise the command is forwarded
/// and the primary's response printed.
pub async fn run_instance(
    paths: &AppPaths,
    settings: &Settings,
    options: InstanceOptions,
) -> Result<ExitCode> {
    paths
        .ensure_dirs()
        .with_context(|| format!("Failed to create config directory {:?}", paths.config_dir()))?;

    // A plain launch asks the running instance for its status
    let forwarded = options.command.clone().unwrap_or(IpcCommand::Status);
    let role = Coordinator::from_settings(paths.clone(), settings)
        .acquire_or_delegate(&forwarded)
        .await
        .context("Failed to start or reach the CustomRPC instance")?;

    match role {
        Role::Secondary(response) => {
            if options.command.is_none() && !options.quiet {
                print_info("CustomRPC is already running");
            }
            Ok(print_response(&response))
        }
        Role::Primary(primary) => run_as_primary(primary, paths, settings, options).await,
    }
}

async fn run_as_primary(
    primary: PrimaryInstance,
    paths: &AppPaths,
    settings: &Settings,
    options: InstanceOptions,
) -> Result<ExitCode> {
    tracing::info!(
        "Instance {} serving IPC on {}",
        primary.pid(),
        ipc_address(primary.port())
    );

    let profiles = ProfileStore::open(paths.profiles_dir()).with_context(|| {
        format!(
            "Failed to open profile store at {:?}",
            paths.profiles_dir()
        )
    })?;
    let state = HostState::new(profiles, Box::new(DiscordPresence::new()))
        .with_settings(paths.settings_file(), settings)
        .into_shared();
    let shutdown = CancellationToken::new();

    let mut exit = ExitCode::SUCCESS;
    match options.command {
        Some(command) => {
            let response = dispatch_shared(&state, command, &shutdown).await;
            exit = print_response(&response);
        }
        None if settings.auto_connect => auto_connect(&state, settings, &shutdown).await,
        None => {}
    }

    if options.once {
        shutdown.cancel();
    }
    if !shutdown.is_cancelled() {
        if !options.quiet && !options.minimized {
            print_info(&format!(
                "CustomRPC running (pid {}, port {})",
                primary.pid(),
                primary.port()
            ));
        }
        spawn_signal_handler(shutdown.clone());
    }

    run_primary(primary, state, HostOptions::from(settings), shutdown).await?;
    Ok(exit)
}

async fn auto_connect(state: &SharedState, settings: &Settings, shutdown: &CancellationToken) {
    let command = IpcCommand::Connect {
        profile: settings.auto_connect_profile.clone(),
    };
    let response = dispatch_shared(state, command, shutdown).await;
    if response.is_success() {
        tracing::info!("Auto-connect: {}", response);
    } else {
        tracing::warn!("Auto-connect failed: {}", response);
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
            _ = shutdown.cancelled() => return,
        }

        shutdown.cancel();
    });
}
