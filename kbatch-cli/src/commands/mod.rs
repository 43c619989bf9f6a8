//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod cluster;
mod job;

use anyhow::Result;
use clap::Subcommand;
use kbatch_adapter::{KubernetesAdapter, ManifestRenderer, ShellRunner, SystemIdentity};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a job described by a YAML descriptor
    Submit {
        /// Job descriptor file
        descriptor: PathBuf,

        /// Script to run, mounted into the pod as script.sh
        #[arg(long)]
        script: Option<PathBuf>,

        /// Directory to save the rendered pod.yml in
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
    /// Print the manifests a descriptor would submit
    Render {
        /// Job descriptor file
        descriptor: PathBuf,

        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Show details of a job
    Info {
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the state of a job
    Status { id: String },
    /// Delete a job and its companion objects
    Delete { id: String },
    /// List jobs
    List {
        /// Only jobs owned by these users
        #[arg(long = "owner")]
        owners: Vec<String>,

        #[arg(long)]
        json: bool,
    },
    /// Register the cluster and apply the configured credentials
    Configure,
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - CLI configuration
pub fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit {
            descriptor,
            script,
            workdir,
        } => job::submit(&bootstrapped(config)?, &descriptor, script.as_deref(), workdir),
        Commands::Render { descriptor, script } => {
            job::render(&adapter(config)?, &descriptor, script.as_deref())
        }
        Commands::Info { id, json } => job::info(&bootstrapped(config)?, &id, json),
        Commands::Status { id } => job::status(&bootstrapped(config)?, &id),
        Commands::Delete { id } => job::delete(&bootstrapped(config)?, &id),
        Commands::List { owners, json } => job::list(&bootstrapped(config)?, &owners, json),
        Commands::Configure => cluster::configure(&adapter(config)?),
    }
}

/// Adapter with no kubeconfig side effects
fn adapter(config: &Config) -> Result<KubernetesAdapter> {
    Ok(KubernetesAdapter::new(
        config.adapter.clone(),
        Arc::new(ShellRunner),
        Arc::new(SystemIdentity),
        Arc::new(ManifestRenderer),
    )?)
}

/// Adapter after registering the cluster and credentials
fn bootstrapped(config: &Config) -> Result<KubernetesAdapter> {
    Ok(KubernetesAdapter::bootstrap(
        config.adapter.clone(),
        Arc::new(ShellRunner),
        Arc::new(SystemIdentity),
        Arc::new(ManifestRenderer),
    )?)
}
