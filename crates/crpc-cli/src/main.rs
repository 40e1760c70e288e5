//! CustomRPC CLI
//!
//! Single binary for all CustomRPC operations:
//! - Instance control (start the resident instance or forward a command to it)
//! - Profile management on the local profile store
//! - Config inspection and lock cleanup

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crpc_core::config::{load_settings, LOG_FILE_NAME};
use crpc_core::{AppPaths, Settings};
use custom_rpc::commands::{self, InstanceFlags, InstanceOptions};
use custom_rpc::output::print_error;

#[derive(Parser)]
#[command(name = "custom-rpc")]
#[command(author, version, about = "Custom Rich Presence manager")]
#[command(propagate_version = true)]
#[command(group(
    ArgGroup::new("action")
        .args(["connect", "disconnect", "list_profiles", "quit", "status"])
))]
struct Cli {
    /// Profile to connect (with --connect) or select
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,

    /// Connect presence with --profile, or with the last used profile
    #[arg(long)]
    connect: bool,

    /// Clear presence and disconnect
    #[arg(long, conflicts_with = "profile")]
    disconnect: bool,

    /// List profile names
    #[arg(long, conflicts_with = "profile")]
    list_profiles: bool,

    /// Stop the running instance
    #[arg(long, conflicts_with = "profile")]
    quit: bool,

    /// Show whether an instance is running and what it is connected to
    #[arg(long, conflicts_with = "profile")]
    status: bool,

    /// Start the resident instance without the startup banner
    #[arg(long)]
    minimized: bool,

    /// Exit after running the command instead of staying resident
    #[arg(long)]
    once: bool,

    /// Configuration directory (defaults to the platform config directory)
    #[arg(long, global = true, env = "CUSTOMRPC_CONFIG_DIR", value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage presence profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Stop a stuck instance and remove its lock and port files
    Cleanup {
        /// Seconds to wait for the instance to exit before killing it
        #[arg(long, default_value_t = 3)]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List profiles
    List,
    /// Show a profile
    Show {
        name: String,
        /// Print the raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a profile from a JSON file
    Import {
        file: PathBuf,
        /// Name to import under (defaults to the name in the file)
        #[arg(long)]
        name: Option<String>,
    },
    /// Export a profile to a JSON file
    Export { name: String, file: PathBuf },
    /// Delete a profile
    Delete { name: String },
    /// Rename a profile
    Rename { old_name: String, new_name: String },
    /// Copy a profile under a new name
    Duplicate { source: String, new_name: String },
    /// Show the profiles directory
    Path,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config directory path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = cli
        .config_dir
        .clone()
        .map(AppPaths::at)
        .unwrap_or_else(AppPaths::platform_default);

    // Resident runs log to a file as well
    let instance_run = cli.command.is_none();
    let (settings, settings_error) = match load_settings(&paths.settings_file()) {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };
    let log_dir = (instance_run && paths.ensure_dirs().is_ok()).then(|| paths.logs_dir());
    let _log_guard = init_tracing(&cli, &settings, log_dir.as_deref());

    if let Some(e) = settings_error {
        tracing::warn!(
            "Failed to load settings from {:?}: {}, using defaults",
            paths.settings_file(),
            e
        );
    }

    match run(cli, &paths, &settings).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, paths: &AppPaths, settings: &Settings) -> Result<ExitCode> {
    let command = match cli.command {
        Some(command) => command,
        None => {
            let flags = InstanceFlags {
                profile: cli.profile,
                connect: cli.connect,
                disconnect: cli.disconnect,
                list_profiles: cli.list_profiles,
                quit: cli.quit,
                status: cli.status,
            };
            let options = InstanceOptions {
                command: flags.to_command(),
                once: cli.once,
                minimized: cli.minimized,
                quiet: cli.quiet,
            };
            return commands::run_instance(paths, settings, options).await;
        }
    };

    match command {
        Commands::Profile { action } => match action {
            ProfileAction::List => commands::profile_list(paths)?,
            ProfileAction::Show { name, json } => commands::profile_show(paths, &name, json)?,
            ProfileAction::Import { file, name } => {
                commands::profile_import(paths, &file, name.as_deref())?
            }
            ProfileAction::Export { name, file } => commands::profile_export(paths, &name, &file)?,
            ProfileAction::Delete { name } => commands::profile_delete(paths, &name)?,
            ProfileAction::Rename { old_name, new_name } => {
                commands::profile_rename(paths, &old_name, &new_name)?
            }
            ProfileAction::Duplicate { source, new_name } => {
                commands::profile_duplicate(paths, &source, &new_name)?
            }
            ProfileAction::Path => commands::profile_path(paths)?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(paths)?,
            ConfigAction::Path => commands::config_path(paths)?,
        },
        Commands::Cleanup { timeout } => {
            commands::cleanup_command(paths, settings, Duration::from_secs(timeout)).await?
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Console logging to stderr, plus a daily log file when `log_dir` is given
///
/// `RUST_LOG` overrides both filters. The returned guard flushes the file
/// writer and must live until exit.
fn init_tracing(cli: &Cli, settings: &Settings, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console_level = match (cli.quiet, cli.debug, cli.verbose) {
        (true, _, _) => "error",
        (false, true, 0..=2) => "debug",
        (false, false, 0) => "warn",
        (false, false, 1) => "info",
        (false, _, 2) => "debug",
        (false, _, _) => "trace",
    };
    let file_level = if cli.debug || cli.verbose >= 2 {
        console_level
    } else {
        settings.log_level.as_str()
    };

    let filter = |level: &str| {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()))
    };

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter(console_level));

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter(file_level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}
