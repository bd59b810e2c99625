//! Archive codec seam and its zip implementation.

use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to do when an entry's destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractPolicy {
    /// Replace existing files
    Overwrite,
    /// Leave existing files untouched
    KeepExisting,
}

/// Counts from one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Files written
    pub files: usize,
    /// Directories created
    pub directories: usize,
    /// Files left alone under [`ExtractPolicy::KeepExisting`]
    pub kept: usize,
    /// Entries whose names would escape the target
    pub rejected: usize,
}

/// Unpacks an archive file into a directory.
#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Extract every entry of `archive` below `target`.
    ///
    /// # Errors
    ///
    /// Fails with [`ProvisionError::Archive`] when the archive cannot be
    /// read or an entry cannot be written.
    async fn extract(&self, archive: &Path, target: &Path, policy: ExtractPolicy) -> Result<ExtractSummary>;
}

/// [`ArchiveCodec`] backed by the `zip` crate, run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

#[async_trait]
impl ArchiveCodec for ZipCodec {
    async fn extract(&self, archive: &Path, target: &Path, policy: ExtractPolicy) -> Result<ExtractSummary> {
        let archive_path = archive.to_path_buf();
        let target_path = target.to_path_buf();
        let summary = tokio::task::spawn_blocking(move || extract_zip(&archive_path, &target_path, policy))
            .await
            .map_err(|e| archive_error(archive, e.to_string()))?
            .map_err(|e| archive_error(archive, e.to_string()))?;

        debug!(
            archive = %archive.display(),
            files = summary.files,
            kept = summary.kept,
            "Archive extracted"
        );
        Ok(summary)
    }
}

fn archive_error(path: &Path, message: String) -> ProvisionError {
    ProvisionError::Archive {
        path: path.to_path_buf(),
        message,
    }
}

fn extract_zip(archive_path: &Path, target: &Path, policy: ExtractPolicy) -> io::Result<ExtractSummary> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(io::Error::other)?;
    let mut summary = ExtractSummary::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        let Some(entry_path) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping archive entry outside the target");
            summary.rejected = summary.rejected.saturating_add(1);
            continue;
        };
        let output_path: PathBuf = target.join(entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
            summary.directories = summary.directories.saturating_add(1);
            continue;
        }

        if policy == ExtractPolicy::KeepExisting && fs::symlink_metadata(&output_path).is_ok() {
            summary.kept = summary.kept.saturating_add(1);
            continue;
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&output_path)?;
        io::copy(&mut entry, &mut outfile)?;
        summary.files = summary.files.saturating_add(1);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobfree_test_helpers::prelude::*;
    use std::collections::BTreeMap;

    fn entries(pairs: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.to_vec())).collect()
    }

    #[tokio::test]
    async fn test_extracts_nested_tree() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("a.zip");
        std::fs::write(&archive, zip_bytes(&entries(&[("SYSTEM/", b""), ("SYSTEM/etc/hosts", b"h")])))?;

        let target = dir.path().join("out");
        let summary = ZipCodec.extract(&archive, &target, ExtractPolicy::Overwrite).await?;
        assert_eq!(summary.files, 1);
        assert_eq!(summary.directories, 1);
        assert_eq!(std::fs::read(target.join("SYSTEM/etc/hosts"))?, b"h");
        Ok(())
    }

    #[tokio::test]
    async fn test_keep_existing_leaves_files() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("a.zip");
        std::fs::write(&archive, zip_bytes(&entries(&[("a.txt", b"new"), ("b.txt", b"new")])))?;
        let target = dir.path().join("out");
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("a.txt"), b"old")?;

        let summary = ZipCodec.extract(&archive, &target, ExtractPolicy::KeepExisting).await?;
        assert_eq!(summary.kept, 1);
        assert_eq!(std::fs::read(target.join("a.txt"))?, b"old");
        assert_eq!(std::fs::read(target.join("b.txt"))?, b"new");

        ZipCodec.extract(&archive, &target, ExtractPolicy::Overwrite).await?;
        assert_eq!(std::fs::read(target.join("a.txt"))?, b"new");
        Ok(())
    }

    #[tokio::test]
    async fn test_escaping_entry_rejected() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("a.zip");
        std::fs::write(&archive, zip_bytes(&entries(&[("../evil.txt", b"x"), ("ok.txt", b"y")])))?;

        let target = dir.path().join("out");
        let summary = ZipCodec.extract(&archive, &target, ExtractPolicy::Overwrite).await?;
        assert_eq!(summary.rejected, 1);
        assert!(!dir.path().join("evil.txt").exists());
        assert!(target.join("ok.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_not_a_zip() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("a.zip");
        std::fs::write(&archive, b"plain text")?;
        let result = ZipCodec.extract(&archive, dir.path(), ExtractPolicy::Overwrite).await;
        assert!(matches!(result, Err(ProvisionError::Archive { .. })));
        Ok(())
    }
}
