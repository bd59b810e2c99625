//! blobfreectl - provision blob-free firmware distributions
//!
//! Extracts a distribution archive, finds a supported device, pulls the
//! proprietary blobs the distribution leaves out, injects them and builds the
//! boot, recovery and system images.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod completion;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::RebootTarget;

#[derive(Parser)]
#[command(name = "blobfreectl")]
#[command(about = "Provision blob-free firmware distributions onto supported devices")]
#[command(version)]
#[command(long_about = "
blobfreectl turns a blob-free distribution archive into flashable images.
It pulls the proprietary blobs the distribution cannot ship from a rooted,
supported device, injects them into the distribution content and builds the
boot, recovery and system partition images.

Use --json for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output in JSON format for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "BLOBFREECTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline: extract, pull blobs, inject, build images
    Provision {
        /// Distribution archive (`<product>.<anything>.zip`)
        archive: PathBuf,
        /// Serial number of the device to use
        #[arg(short, long)]
        serial: Option<String>,
    },

    /// Extract a distribution into its staging root
    Extract {
        /// Distribution archive
        archive: PathBuf,
    },

    /// List attached supported devices
    Devices {
        /// Device catalog (`devices.json` of a distribution)
        #[arg(long)]
        catalog: PathBuf,
        /// Follow attach and detach events
        #[arg(short, long)]
        watch: bool,
    },

    /// Reboot a ready device into the bootloader or back to the system
    Reboot {
        /// Device serial number
        serial: String,
        /// Where to reboot to
        #[arg(long, value_enum)]
        to: RebootTarget,
        /// Device catalog (`devices.json` of a distribution)
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Inject cached blobs and build images on an existing staging root
    Build {
        /// Staging root created by `extract` or `provision`
        staging_root: PathBuf,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("blobfreectl={log_level},blobfree_device={log_level},blobfree_provision={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::from(error::exit_code(&e))
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    if let Commands::Completion { shell } = &cli.command {
        completion::generate_completion(*shell);
        return Ok(());
    }

    let config = commands::load_config(cli.config.as_deref()).await?;
    match &cli.command {
        Commands::Provision { archive, serial } => {
            commands::provision::execute(config, archive, serial.as_deref(), cli.json).await
        }
        Commands::Extract { archive } => commands::extract::execute(&config, archive, cli.json).await,
        Commands::Devices { catalog, watch } => {
            commands::devices::execute(&config, catalog, *watch, cli.json).await
        }
        Commands::Reboot { serial, to, catalog } => {
            commands::reboot::execute(&config, catalog, serial, *to, cli.json).await
        }
        Commands::Build { staging_root } => commands::build::execute(config, staging_root, cli.json).await,
        Commands::Completion { .. } => Ok(()),
    }
}
