//! CLI command implementations

mod cleanup;
mod config;
mod instance;
mod profile;

pub use cleanup::cleanup_command;
pub use config::{config_path, config_show};
pub use instance::{run_instance, InstanceFlags, InstanceOptions};
pub use profile::{
    profile_delete, profile_duplicate, profile_export, profile_import, profile_list,
    profile_path, profile_rename, profile_show,
};
