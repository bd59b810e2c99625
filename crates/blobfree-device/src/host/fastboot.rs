//! Bootloader handle backed by the host `fastboot` binary.

use super::adb::map_tool_error;
use super::command::ToolCommand;
use crate::error::{DeviceError, Result};
use crate::transport::{DeviceHandle, TransportMode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One device attached in bootloader mode.
#[derive(Debug, Clone)]
pub struct FastbootDevice {
    serial: String,
    tool: PathBuf,
}

impl FastbootDevice {
    /// Create a handle.
    pub fn new(serial: impl Into<String>, tool: impl Into<PathBuf>) -> Self {
        Self {
            serial: serial.into(),
            tool: tool.into(),
        }
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.tool).arg("-s").arg(&self.serial)
    }

    fn unavailable(&self, operation: &str) -> DeviceError {
        DeviceError::wrong_mode(&self.serial, operation, TransportMode::Fastboot)
    }
}

/// Extract `name`'s value from `fastboot getvar` output.
///
/// The tool prints `name: value` on stderr, followed by a timing line.
pub fn parse_getvar(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        (key.trim() == name).then(|| value.trim().to_string())
    })
}

#[async_trait]
impl DeviceHandle for FastbootDevice {
    fn identifier(&self) -> &str {
        &self.serial
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Fastboot
    }

    async fn is_elevated(&self) -> Result<bool> {
        Err(self.unavailable("is_elevated"))
    }

    async fn elevate(&self) -> Result<()> {
        Err(self.unavailable("elevate"))
    }

    async fn shell(&self, _command: &str) -> Result<String> {
        Err(self.unavailable("shell"))
    }

    async fn get_variable(&self, name: &str) -> Result<String> {
        let output = self
            .command()
            .args(["getvar", name])
            .run()
            .await
            .map_err(|e| map_tool_error(&self.serial, e))?;
        let combined = format!("{}\n{}", output.stderr, output.stdout_text());
        parse_getvar(&combined, name).ok_or_else(|| DeviceError::CommandFailed {
            device: self.serial.clone(),
            command: format!("getvar {name}"),
            message: "variable not reported".to_string(),
        })
    }

    async fn pull(&self, _remote: &str, _local: &Path) -> Result<()> {
        Err(self.unavailable("pull"))
    }

    async fn model(&self) -> Result<String> {
        self.get_variable("product").await
    }

    async fn reboot_to_bootloader(&self) -> Result<()> {
        Err(self.unavailable("reboot bootloader"))
    }

    async fn reboot_to_normal(&self) -> Result<()> {
        self.command()
            .arg("reboot")
            .run()
            .await
            .map_err(|e| map_tool_error(&self.serial, e))?;
        Ok(())
    }
}
