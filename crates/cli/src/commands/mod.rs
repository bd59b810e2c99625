//! Command implementations for blobfreectl

pub mod build;
pub mod devices;
pub mod extract;
pub mod provision;
pub mod reboot;

use anyhow::{Context, Result};
use blobfree_provision::ProvisionConfig;
use clap::ValueEnum;
use std::path::Path;

use crate::error::CliError;

/// Reboot destination
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RebootTarget {
    /// From the running OS into the bootloader
    Bootloader,
    /// From the bootloader into the running OS
    System,
}

/// Load `--config` or the default configuration file.
pub async fn load_config(path: Option<&Path>) -> Result<ProvisionConfig> {
    let loaded = match path {
        Some(path) => ProvisionConfig::load_from_path(path).await,
        None => ProvisionConfig::load().await,
    };
    loaded
        .map_err(|e| CliError::InvalidConfiguration(format!("{e:#}")))
        .context("Failed to load configuration")
}
