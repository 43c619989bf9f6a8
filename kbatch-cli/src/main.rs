//! kbatch CLI
//!
//! Command-line interface for submitting and tracking Kubernetes batch jobs.

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kbatch")]
#[command(about = "Run batch jobs as Kubernetes pods", long_about = None)]
struct Cli {
    /// Adapter configuration file (YAML)
    #[arg(long, env = "KBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for daily-rolling log files
    #[arg(long, env = "KBATCH_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log debug output to the console
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Held until exit so buffered file logs are flushed
    let _guard = logging::init(cli.log_dir.as_deref(), cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    handle_command(cli.command, &config)
}
