//! `reboot`: move a ready device between the OS and the bootloader

use anyhow::{Context, Result};
use blobfree_provision::ProvisionConfig;
use colored::*;
use serde_json::json;
use std::path::Path;

use super::RebootTarget;
use super::devices::open_registry;
use crate::output;

/// Execute reboot command
pub async fn execute(
    config: &ProvisionConfig,
    catalog: &Path,
    serial: &str,
    target: RebootTarget,
    json: bool,
) -> Result<()> {
    let (_transport, registry) = open_registry(config, catalog).await?;
    registry.refresh().await.context("Device enumeration failed")?;

    match target {
        RebootTarget::Bootloader => registry.reboot_to_bootloader(serial).await,
        RebootTarget::System => registry.reboot_to_normal(serial).await,
    }
    .with_context(|| format!("Reboot of {serial} failed"))?;

    let destination = match target {
        RebootTarget::Bootloader => "bootloader",
        RebootTarget::System => "system",
    };
    if json {
        output::print_success("reboot", &json!({ "identifier": serial, "target": destination }));
    } else {
        println!("{} Rebooting {} to {}", "✓".green(), serial.bold(), destination);
    }
    Ok(())
}
