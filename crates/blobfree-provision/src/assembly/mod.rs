//! Partition image assembly
//!
//! Builds `boot.img`, `recovery.img` and `system.img` from the staged
//! content tree. The three builds run concurrently and fail independently:
//! a broken system build never stops boot or recovery.
//!
//! - [`ramdisk`]: `RAMDISK/` to gzipped cpio
//! - [`bootimg`]: fragments, kernel and ramdisk to a bootable image
//! - [`worker`]: isolated filesystem image builder
//! - [`toolchain`]: the [`ImageToolchain`] seam and its host implementation

pub mod bootimg;
pub mod ramdisk;
pub mod toolchain;
pub mod worker;

pub use toolchain::{BootImageRequest, HostToolchain, ImageToolchain};
pub use worker::{IsolatedWorker, WorkerRequest, WorkerResponse};

use crate::error::{AssemblyError, ProvisionError, Result};
use crate::fstab::{BuildTask, BuildTasks};
use crate::layout::{self, StagingRoot};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Boot partition image name
pub const BOOT_IMAGE: &str = "boot.img";
/// Recovery partition image name
pub const RECOVERY_IMAGE: &str = "recovery.img";
/// System partition image name
pub const SYSTEM_IMAGE: &str = "system.img";

/// Parse `cmdline-fs.txt`: whitespace-separated options, `#` lines ignored.
pub fn parse_fs_options(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

/// Read and parse `cmdline-fs.txt`.
///
/// # Errors
///
/// Fails if the file cannot be read.
pub async fn load_fs_options(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProvisionError::io(path, e))?;
    Ok(parse_fs_options(&text))
}

/// What happened to one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PartitionOutcome {
    /// Image written to this path
    Built(PathBuf),
    /// No build task for this image
    Skipped,
    /// Build failed
    Failed(#[serde(serialize_with = "serialize_display")] AssemblyError),
}

fn serialize_display<S: Serializer>(error: &AssemblyError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome for one fixed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    /// Image file name
    pub image: String,
    #[serde(flatten)]
    pub outcome: PartitionOutcome,
}

/// Per-partition outcomes of one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyReport {
    pub partitions: Vec<PartitionReport>,
}

impl AssemblyReport {
    pub fn outcome(&self, image: &str) -> Option<&PartitionOutcome> {
        self.partitions
            .iter()
            .find(|p| p.image == image)
            .map(|p| &p.outcome)
    }

    /// Paths of the images built.
    pub fn built(&self) -> Vec<&Path> {
        self.partitions
            .iter()
            .filter_map(|p| match &p.outcome {
                PartitionOutcome::Built(path) => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    /// Images whose build failed.
    pub fn failed(&self) -> Vec<&str> {
        self.partitions
            .iter()
            .filter(|p| matches!(p.outcome, PartitionOutcome::Failed(_)))
            .map(|p| p.image.as_str())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed().is_empty()
    }
}

/// Runs the three partition builds.
pub struct ImageAssembler {
    toolchain: Arc<dyn ImageToolchain>,
    fs_options: Vec<String>,
}

impl ImageAssembler {
    pub fn new(toolchain: Arc<dyn ImageToolchain>) -> Self {
        Self {
            toolchain,
            fs_options: Vec::new(),
        }
    }

    /// Options passed to the filesystem builder.
    pub fn with_fs_options(mut self, options: Vec<String>) -> Self {
        self.fs_options = options;
        self
    }

    /// Build every fixed image that has a task.
    ///
    /// # Errors
    ///
    /// Fails only if `images/` cannot be prepared. Partition failures are
    /// reported in the [`AssemblyReport`].
    pub async fn assemble(&self, root: &StagingRoot, tasks: &BuildTasks) -> Result<AssemblyReport> {
        layout::ensure_directory(&root.images()).await?;

        let (boot, recovery, system) = tokio::join!(
            self.run(BOOT_IMAGE, tasks.get(BOOT_IMAGE), |task| self.build_bootable(task)),
            self.run(RECOVERY_IMAGE, tasks.get(RECOVERY_IMAGE), |task| self.build_bootable(task)),
            self.run(SYSTEM_IMAGE, tasks.get(SYSTEM_IMAGE), |task| self.build_system(task)),
        );

        let report = AssemblyReport {
            partitions: vec![boot, recovery, system],
        };
        info!(
            built = report.built().len(),
            failed = report.failed().len(),
            "Image assembly complete"
        );
        Ok(report)
    }

    async fn run<'a, F, Fut>(&'a self, image: &str, task: Option<&'a BuildTask>, build: F) -> PartitionReport
    where
        F: FnOnce(&'a BuildTask) -> Fut,
        Fut: Future<Output = std::result::Result<PathBuf, AssemblyError>>,
    {
        let outcome = match task {
            None => {
                info!(image, "No build task, skipping");
                PartitionOutcome::Skipped
            }
            Some(task) => match build(task).await {
                Ok(path) => PartitionOutcome::Built(path),
                Err(e) => {
                    error!(image, partition = %task.partition, error = %e, "Partition build failed");
                    PartitionOutcome::Failed(e)
                }
            },
        };
        PartitionReport {
            image: image.to_string(),
            outcome,
        }
    }

    async fn build_bootable(&self, task: &BuildTask) -> std::result::Result<PathBuf, AssemblyError> {
        bootimg::build_boot_image(self.toolchain.as_ref(), task).await
    }

    async fn build_system(&self, task: &BuildTask) -> std::result::Result<PathBuf, AssemblyError> {
        let request = WorkerRequest {
            source: task.source_dir.clone(),
            image: task.image_path.clone(),
            options: self.fs_options.clone(),
        };
        let response = self.toolchain.build_filesystem(&request).await;
        if response.result {
            info!(image = %task.image_name, path = %task.image_path.display(), "Filesystem image built");
            return Ok(task.image_path.clone());
        }
        match response.message {
            None if response.done => Err(AssemblyError::OutputMissing {
                tool: "make_ext4fs".to_string(),
                path: task.image_path.clone(),
            }),
            message => Err(AssemblyError::ToolFailed {
                tool: "make_ext4fs".to_string(),
                message: message.unwrap_or_else(|| "worker did not complete".to_string()),
            }),
        }
    }
}
