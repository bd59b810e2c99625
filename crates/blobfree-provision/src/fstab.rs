//! Recovery fstab parsing and build task resolution.

use crate::error::{ProvisionError, Result};
use crate::layout::{self, StagingRoot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of the lines that describe a partition.
const DEVICE_PREFIX: &str = "/dev";

/// One partition line of the recovery fstab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// Block device path, field 0
    pub device: String,
    /// Mount point without its leading `/`
    pub mount_point: String,
}

impl FstabEntry {
    /// Bootloader partition name: last segment of the device path.
    pub fn partition(&self) -> &str {
        self.device.rsplit('/').next().unwrap_or(&self.device)
    }

    /// Output image file name.
    pub fn image_name(&self) -> String {
        format!("{}.img", self.mount_point)
    }
}

/// Parse fstab text. Lines not starting with a device path are ignored.
pub fn parse_fstab(text: &str) -> Vec<FstabEntry> {
    text.lines().filter_map(parse_fstab_line).collect()
}

fn parse_fstab_line(line: &str) -> Option<FstabEntry> {
    let line = line.trim();
    if !line.starts_with(DEVICE_PREFIX) {
        return None;
    }
    let mut fields = line.split_whitespace();
    let device = fields.next()?;
    let mount = layout::strip_leading_separator(fields.next()?);
    if !layout::is_contained(mount) || mount.contains('/') {
        return None;
    }
    Some(FstabEntry {
        device: device.to_string(),
        mount_point: mount.to_string(),
    })
}

/// Read and parse the recovery fstab.
///
/// # Errors
///
/// Fails if the file cannot be read.
pub async fn load_fstab(path: &Path) -> Result<Vec<FstabEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProvisionError::io(path, e))?;
    Ok(parse_fstab(&text))
}

/// How to build one partition image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTask {
    /// Image file name, e.g. `system.img`
    pub image_name: String,
    /// Content directory, e.g. `content/SYSTEM`
    pub source_dir: PathBuf,
    /// Output path in `images/`
    pub image_path: PathBuf,
    /// Bootloader partition name
    pub partition: String,
}

/// Build tasks keyed by image file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildTasks(BTreeMap<String, BuildTask>);

impl BuildTasks {
    pub fn get(&self, image_name: &str) -> Option<&BuildTask> {
        self.0.get(image_name)
    }

    pub fn insert(&mut self, task: BuildTask) {
        self.0.insert(task.image_name.clone(), task);
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildTask> {
        self.0.values()
    }

    pub fn image_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Derive a build task for every entry whose content directory exists.
///
/// Later entries for the same image replace earlier ones.
pub async fn resolve_build_tasks(root: &StagingRoot, entries: &[FstabEntry]) -> BuildTasks {
    let images = root.images();
    let mut tasks = BuildTasks::default();
    for entry in entries {
        let source_dir = root.mount_dir(&entry.mount_point);
        if !layout::is_directory(&source_dir).await {
            debug!(mount = %entry.mount_point, dir = %source_dir.display(), "No content directory, skipping");
            continue;
        }
        let image_name = entry.image_name();
        tasks.insert(BuildTask {
            image_path: images.join(&image_name),
            image_name,
            source_dir,
            partition: entry.partition().to_string(),
        });
    }
    tasks
}

/// Mount points whose content directory exists, for injection placement.
pub async fn staged_mounts(root: &StagingRoot, entries: &[FstabEntry]) -> Vec<String> {
    let mut mounts = Vec::new();
    for entry in entries {
        if layout::is_directory(&root.mount_dir(&entry.mount_point)).await
            && !mounts.contains(&entry.mount_point)
        {
            mounts.push(entry.mount_point.clone());
        }
    }
    mounts
}
