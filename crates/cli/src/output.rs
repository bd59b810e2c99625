//! Output formatting for CLI responses

use anyhow::Error;
use blobfree_device::{DeviceListEvent, ReadyDevice};
use blobfree_provision::{AssemblyReport, BuildReport, PartitionOutcome, SessionReport, StagingRoot};
use colored::*;
use serde::Serialize;
use serde_json::json;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": format!("{error:#}"),
            "exit_code": crate::error::exit_code(error),
        }
    });
    print_json(&error_json);
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "Caused by:".yellow(), cause);
    }
}

/// Wrap `value` as `{"success": true, <key>: value}` and print it.
pub fn print_success<T: Serialize>(key: &str, value: &T) {
    let mut output = serde_json::Map::new();
    output.insert("success".to_string(), json!(true));
    match serde_json::to_value(value) {
        Ok(value) => {
            output.insert(key.to_string(), value);
            print_json(&serde_json::Value::Object(output));
        }
        Err(e) => eprintln!("Failed to format {key} as JSON: {e}"),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format output as JSON: {e}"),
    }
}

/// Print the ready list
pub fn print_device_list(devices: &[ReadyDevice], json: bool) {
    if json {
        print_success("devices", &devices);
        return;
    }
    if devices.is_empty() {
        println!("{}", "No supported devices found".yellow());
        return;
    }
    println!("{}", "Ready Devices:".bold());
    for device in devices {
        print_device_human(device);
    }
}

fn print_device_human(device: &ReadyDevice) {
    println!(
        "  {} {} ({}, {})",
        "●".green(),
        device.label.bold(),
        device.identifier.dimmed(),
        device.mode
    );
    println!("    Descriptor: {}", device.descriptor);
}

/// Print one registry change while watching
pub fn print_device_event(event: &DeviceListEvent, json: bool) {
    if json {
        let value = match event {
            DeviceListEvent::Added(device) => json!({ "event": "added", "device": device }),
            DeviceListEvent::Removed { identifier, mode } => {
                json!({ "event": "removed", "identifier": identifier, "mode": mode })
            }
            DeviceListEvent::Unsupported { identifier, mode } => {
                json!({ "event": "unsupported", "identifier": identifier, "mode": mode })
            }
        };
        match serde_json::to_string(&value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to format event as JSON: {e}"),
        }
        return;
    }
    match event {
        DeviceListEvent::Added(device) => {
            print!("{} ", "+".green().bold());
            print_device_human(device);
        }
        DeviceListEvent::Removed { identifier, mode } => {
            println!("{}   {} ({mode})", "-".red().bold(), identifier.dimmed());
        }
        DeviceListEvent::Unsupported { identifier, mode } => {
            println!("{}   {} ({mode}) is not a supported device", "?".yellow().bold(), identifier);
        }
    }
}

/// Print where a distribution was staged
pub fn print_staged(root: &StagingRoot, descriptors: usize, json: bool) {
    if json {
        print_success(
            "staging",
            &json!({ "root": root.path(), "descriptors": descriptors }),
        );
        return;
    }
    println!("{} {}", "✓".green(), "Distribution extracted".bold());
    println!("  Staging root: {}", root.path().display());
    println!("  Supported devices: {descriptors}");
}

/// Print a full provisioning run
pub fn print_session_report(report: &SessionReport, json: bool) {
    if json {
        print_success("report", report);
        return;
    }
    println!("{} {}", "Staging root:".bold(), report.staging_root.display());
    println!(
        "{} {} ({})",
        "Device:".bold(),
        report.device.label,
        report.device.identifier.dimmed()
    );

    let acquisition = &report.acquisition;
    println!("{}", "Blobs:".bold());
    println!("  Fetched: {}", acquisition.fetched.len());
    println!("  Cached: {}", acquisition.already_cached.len());
    if !acquisition.failed.is_empty() {
        println!("  {} {}", "Failed:".red(), acquisition.failed.len());
        for source in &acquisition.failed {
            println!("    • {}", source.red());
        }
    }
    print_build_human(&report.build);
}

/// Print an inject and assemble run
pub fn print_build_report(report: &BuildReport, json: bool) {
    if json {
        print_success("report", report);
    } else {
        print_build_human(report);
    }
}

fn print_build_human(report: &BuildReport) {
    let injection = &report.injection;
    println!("{}", "Injection:".bold());
    println!("  Injected: {}", injection.injected.len());
    println!("  Already present: {}", injection.already_present.len());
    if !injection.failed.is_empty() {
        println!("  {} {}", "Failed:".red(), injection.failed.len());
        for target in &injection.failed {
            println!("    • {}", target.red());
        }
    }
    print_assembly_human(&report.assembly);
}

fn print_assembly_human(report: &AssemblyReport) {
    println!("{}", "Images:".bold());
    for partition in &report.partitions {
        match &partition.outcome {
            PartitionOutcome::Built(path) => {
                println!("  {} {} → {}", "✓".green(), partition.image, path.display());
            }
            PartitionOutcome::Skipped => {
                println!("  {} {} {}", "-".dimmed(), partition.image, "(no build task)".dimmed());
            }
            PartitionOutcome::Failed(error) => {
                println!("  {} {}: {}", "✗".red(), partition.image.bold(), error);
            }
        }
    }
}
