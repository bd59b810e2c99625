//! External image builders.

use super::worker::{IsolatedWorker, WorkerRequest, WorkerResponse};
use crate::config::ProvisionConfig;
use crate::error::AssemblyError;
use async_trait::async_trait;
use blobfree_device::host::{ToolCommand, ToolError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Inputs of the boot image header writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImageRequest {
    pub kernel: PathBuf,
    pub ramdisk: PathBuf,
    pub cmdline: String,
    pub pagesize: u32,
    pub base: String,
    /// Device-tree image, when the distribution ships one
    pub device_tree: Option<PathBuf>,
    pub output: PathBuf,
}

impl BootImageRequest {
    /// `mkbootimg` style argument list.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = vec![
            "--kernel".to_string(),
            self.kernel.display().to_string(),
            "--ramdisk".to_string(),
            self.ramdisk.display().to_string(),
            "--cmdline".to_string(),
            self.cmdline.clone(),
            "--pagesize".to_string(),
            self.pagesize.to_string(),
            "--base".to_string(),
            self.base.clone(),
        ];
        if let Some(dt) = &self.device_tree {
            args.push("--dt".to_string());
            args.push(dt.display().to_string());
        }
        args.push("--output".to_string());
        args.push(self.output.display().to_string());
        args
    }
}

/// Opaque image builders used by the assembly pipeline.
#[async_trait]
pub trait ImageToolchain: Send + Sync {
    /// Pack a `RAMDISK` directory into an uncompressed cpio stream.
    async fn pack_ramdisk(&self, ramdisk_dir: &Path) -> Result<Vec<u8>, AssemblyError>;

    /// Combine kernel, ramdisk and fragments into a bootable image.
    async fn write_boot_image(&self, request: &BootImageRequest) -> Result<(), AssemblyError>;

    /// Build a filesystem image in an isolated worker.
    async fn build_filesystem(&self, request: &WorkerRequest) -> WorkerResponse;
}

/// [`ImageToolchain`] running `mkbootfs`, `mkbootimg` and `make_ext4fs`.
#[derive(Debug, Clone)]
pub struct HostToolchain {
    mkbootfs: PathBuf,
    mkbootimg: PathBuf,
    timeout: Duration,
    worker: IsolatedWorker,
}

impl HostToolchain {
    pub fn new(mkbootfs: PathBuf, mkbootimg: PathBuf, make_ext4fs: PathBuf, timeout: Duration) -> Self {
        Self {
            mkbootfs,
            mkbootimg,
            timeout,
            worker: IsolatedWorker::new(make_ext4fs, timeout),
        }
    }

    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self::new(
            config.tools.mkbootfs.clone(),
            config.tools.mkbootimg.clone(),
            config.tools.make_ext4fs.clone(),
            config.build_timeout(),
        )
    }
}

fn tool_failed(tool: &str, e: ToolError) -> AssemblyError {
    AssemblyError::ToolFailed {
        tool: tool.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ImageToolchain for HostToolchain {
    async fn pack_ramdisk(&self, ramdisk_dir: &Path) -> Result<Vec<u8>, AssemblyError> {
        let output = ToolCommand::new(&self.mkbootfs)
            .arg_path(ramdisk_dir)
            .timeout(self.timeout)
            .run()
            .await
            .map_err(|e| tool_failed("mkbootfs", e))?;
        Ok(output.stdout)
    }

    async fn write_boot_image(&self, request: &BootImageRequest) -> Result<(), AssemblyError> {
        ToolCommand::new(&self.mkbootimg)
            .args(request.arguments())
            .timeout(self.timeout)
            .run()
            .await
            .map_err(|e| tool_failed("mkbootimg", e))?;
        Ok(())
    }

    async fn build_filesystem(&self, request: &WorkerRequest) -> WorkerResponse {
        self.worker.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_arguments() {
        let mut request = BootImageRequest {
            kernel: "/s/content/BOOT/kernel".into(),
            ramdisk: "/s/images/boot-ramdisk.img".into(),
            cmdline: "console=ttyHSL0 androidboot.hardware=qcom".into(),
            pagesize: 2048,
            base: "0x00000000".into(),
            device_tree: None,
            output: "/s/images/boot.img".into(),
        };
        let args = request.arguments();
        assert_eq!(args.len(), 12);
        assert_eq!(args.get(5).map(String::as_str), Some("console=ttyHSL0 androidboot.hardware=qcom"));
        assert!(!args.iter().any(|a| a == "--dt"));

        request.device_tree = Some("/s/dt.img".into());
        let args = request.arguments();
        let dt = args.iter().position(|a| a == "--dt");
        assert_eq!(dt.and_then(|i| args.get(i + 1)).map(String::as_str), Some("/s/dt.img"));
        assert_eq!(args.last().map(String::as_str), Some("/s/images/boot.img"));
    }
}
