//! Debug-bridge handle backed by the host `adb` binary.

use super::command::{ToolCommand, ToolError};
use crate::error::{DeviceError, Result};
use crate::transport::{DeviceHandle, TransportMode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Property holding the marketing model name.
pub const MODEL_PROPERTY: &str = "ro.product.model";

/// One device attached over the debug bridge.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    serial: String,
    tool: PathBuf,
    channel: Arc<Mutex<()>>,
}

impl AdbDevice {
    /// Create a handle. `channel` serializes transfers to this device.
    pub fn new(serial: impl Into<String>, tool: impl Into<PathBuf>, channel: Arc<Mutex<()>>) -> Self {
        Self {
            serial: serial.into(),
            tool: tool.into(),
            channel,
        }
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.tool).arg("-s").arg(&self.serial)
    }

    fn map_error(&self, err: ToolError) -> DeviceError {
        map_tool_error(&self.serial, err)
    }
}

pub(crate) fn map_tool_error(serial: &str, err: ToolError) -> DeviceError {
    match err {
        ToolError::Spawn { program, message } => DeviceError::Spawn { program, message },
        ToolError::Failed { command, stderr, .. } => DeviceError::CommandFailed {
            device: serial.to_string(),
            command,
            message: stderr,
        },
        ToolError::TimedOut { command, timeout } => DeviceError::Timeout {
            device: serial.to_string(),
            operation: command,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
    }
}

/// Whether `id -u` output names uid 0.
///
/// Older toolbox `id` ignores `-u` and prints the full `uid=0(root) ...`
/// form, so both shapes are accepted.
fn is_root_uid(output: &str) -> bool {
    let output = output.trim();
    output == "0" || output.starts_with("uid=0(")
}

#[async_trait]
impl DeviceHandle for AdbDevice {
    fn identifier(&self) -> &str {
        &self.serial
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Adb
    }

    async fn is_elevated(&self) -> Result<bool> {
        let uid = self.shell("id -u").await?;
        Ok(is_root_uid(&uid))
    }

    async fn elevate(&self) -> Result<()> {
        let output = self
            .command()
            .arg("root")
            .run()
            .await
            .map_err(|e| self.map_error(e))?;
        debug!(device = %self.serial, response = %output.stdout_text().trim(), "adb root");
        self.command()
            .arg("wait-for-device")
            .run()
            .await
            .map_err(|e| self.map_error(e))?;
        Ok(())
    }

    async fn shell(&self, command: &str) -> Result<String> {
        let output = self
            .command()
            .arg("shell")
            .arg(command)
            .run()
            .await
            .map_err(|e| self.map_error(e))?;
        Ok(output.stdout_text())
    }

    async fn get_variable(&self, _name: &str) -> Result<String> {
        Err(DeviceError::wrong_mode(&self.serial, "getvar", TransportMode::Adb))
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        let _transfer = self.channel.lock().await;
        self.command()
            .arg("pull")
            .arg(remote)
            .arg_path(local)
            .run()
            .await
            .map_err(|e| self.map_error(e))?;
        Ok(())
    }

    async fn model(&self) -> Result<String> {
        let model = self.shell(&format!("getprop {MODEL_PROPERTY}")).await?;
        Ok(model.trim().to_string())
    }

    async fn reboot_to_bootloader(&self) -> Result<()> {
        self.command()
            .args(["reboot", "bootloader"])
            .run()
            .await
            .map_err(|e| self.map_error(e))?;
        Ok(())
    }

    async fn reboot_to_normal(&self) -> Result<()> {
        self.command()
            .arg("reboot")
            .run()
            .await
            .map_err(|e| self.map_error(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_uid_forms() {
        assert!(is_root_uid("0\n"));
        assert!(is_root_uid("uid=0(root) gid=0(root) context=u:r:su:s0\r\n"));
        assert!(!is_root_uid("2000\n"));
        assert!(!is_root_uid("uid=2000(shell) gid=2000(shell)"));
        assert!(!is_root_uid("uid=0"));
        assert!(!is_root_uid(""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_toolbox_id_output_counts_as_elevated() -> std::result::Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let tool = dir.path().join("adb");
        std::fs::write(&tool, "#!/bin/sh\necho 'uid=0(root) gid=0(root)'\n")?;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755))?;

        let device = AdbDevice::new("A1", &tool, Arc::new(Mutex::new(())));
        assert!(device.is_elevated().await?);
        Ok(())
    }
}
