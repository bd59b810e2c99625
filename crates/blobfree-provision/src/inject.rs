//! Blob injection into the content tree.
//!
//! Copies each acquired blob from `blobs/<source>` to its target in
//! `content/`. Existing targets are never touched, so a re-run only fills
//! the gaps.

use crate::error::Result;
use crate::layout::{self, StagingRoot};
use crate::manifest::{BlobEntry, BlobMapping};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of one injection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InjectionReport {
    /// Targets copied in this run
    pub injected: Vec<String>,
    /// Targets that already existed
    pub already_present: Vec<String>,
    /// Targets that could not be copied
    pub failed: Vec<String>,
}

/// Where a target lands in the content tree.
///
/// A target whose first segment is a staged mount point goes inside that
/// mount's directory; anything else goes directly below `content/`.
pub fn placement(content: &Path, target: &str, mounts: &[String]) -> PathBuf {
    let first = target.split('/').next().unwrap_or_default();
    match mounts.iter().find(|mount| mount.as_str() == first) {
        Some(mount) => content.join(mount.to_uppercase()).join(target),
        None => content.join(target),
    }
}

/// Copy every cached blob of `mapping` whose target is missing.
///
/// # Errors
///
/// Fails only if `content/` cannot be prepared. Per-entry copy failures are
/// reported in [`InjectionReport::failed`].
pub async fn inject_blobs(root: &StagingRoot, mapping: &BlobMapping, mounts: &[String]) -> Result<InjectionReport> {
    let content = root.content();
    layout::ensure_directory(&content).await?;

    let mut report = InjectionReport::default();
    for entry in mapping.entries() {
        let destination = placement(&content, &entry.target, mounts);
        if layout::exists(&destination).await {
            debug!(target = %entry.target, "Target already present");
            report.already_present.push(entry.target.clone());
            continue;
        }

        match copy_blob(root, entry, &destination).await {
            Ok(()) => {
                debug!(blob = %entry.source, target = %destination.display(), "Blob injected");
                report.injected.push(entry.target.clone());
            }
            Err(e) => {
                warn!(blob = %entry.source, target = %entry.target, error = %e, "Blob injection failed");
                report.failed.push(entry.target.clone());
            }
        }
    }

    info!(
        injected = report.injected.len(),
        present = report.already_present.len(),
        failed = report.failed.len(),
        "Blob injection complete"
    );
    Ok(report)
}

async fn copy_blob(root: &StagingRoot, entry: &BlobEntry, destination: &Path) -> std::io::Result<()> {
    let source = root.blobs().join(&entry.source);
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut staging = destination.as_os_str().to_owned();
    staging.push(".injecting");
    let staging = PathBuf::from(staging);

    let outcome = match tokio::fs::copy(&source, &staging).await {
        Ok(_) => tokio::fs::rename(&staging, destination).await,
        Err(e) => Err(e),
    };
    if outcome.is_err()
        && let Err(cleanup) = tokio::fs::remove_file(&staging).await
        && cleanup.kind() != std::io::ErrorKind::NotFound
    {
        debug!(path = %staging.display(), error = %cleanup, "Could not remove staging copy");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement() {
        let content = Path::new("/s/content");
        let mounts = vec!["system".to_string()];
        assert_eq!(
            placement(content, "system/lib/a.bin", &mounts),
            PathBuf::from("/s/content/SYSTEM/system/lib/a.bin")
        );
        assert_eq!(placement(content, "vendor/a.bin", &mounts), PathBuf::from("/s/content/vendor/a.bin"));
        assert_eq!(placement(content, "systemx/a", &mounts), PathBuf::from("/s/content/systemx/a"));
    }

    #[tokio::test]
    async fn test_missing_blob_is_per_entry_failure() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = StagingRoot::new(dir.path());
        std::fs::create_dir_all(root.blobs())?;
        std::fs::write(root.blobs().join("b.bin"), b"b")?;

        let mapping = BlobMapping::parse("a.bin:x/a.bin\nb.bin:x/b.bin\n");
        let report = inject_blobs(&root, &mapping, &[]).await.map_err(std::io::Error::other)?;
        assert_eq!(report.failed, vec!["x/a.bin".to_string()]);
        assert_eq!(report.injected, vec!["x/b.bin".to_string()]);
        assert_eq!(std::fs::read(root.content().join("x/b.bin"))?, b"b");
        assert!(!root.content().join("x/a.bin.injecting").exists());
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_interrupted_copy_leaves_no_staging_file() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = StagingRoot::new(dir.path());
        std::fs::create_dir_all(root.blobs())?;
        // Opens as a regular file, then fails on the first read.
        std::os::unix::fs::symlink("/proc/self/mem", root.blobs().join("broken.bin"))?;

        let mapping = BlobMapping::parse("broken.bin:x/broken.bin
");
        let report = inject_blobs(&root, &mapping, &[]).await.map_err(std::io::Error::other)?;
        assert_eq!(report.failed, vec!["x/broken.bin".to_string()]);
        assert!(!root.content().join("x/broken.bin").exists());
        assert!(!root.content().join("x/broken.bin.injecting").exists());
        Ok(())
    }
}
