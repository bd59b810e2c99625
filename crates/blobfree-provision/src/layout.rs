//! Staging root layout and distribution file names.

use crate::error::{ProvisionError, Result};
use std::path::{Component, Path, PathBuf};

/// Nested archive holding the content tree
pub const BLOB_FREE_ARCHIVE: &str = "blobfree.zip";
/// Blob injection manifest
pub const BLOBS_MANIFEST: &str = "blobs-toinject.txt";
/// Filesystem builder options
pub const FS_OPTIONS: &str = "cmdline-fs.txt";
/// Supported-device catalog
pub const DEVICE_CATALOG: &str = "devices.json";
/// Recovery partition table
pub const RECOVERY_FSTAB: &str = "recovery.fstab";
/// Optional device-tree image at the staging root
pub const DEVICE_TREE: &str = "dt.img";

/// Files every distribution must carry at its root.
pub const REQUIRED_FILES: [&str; 5] = [
    BLOB_FREE_ARCHIVE,
    BLOBS_MANIFEST,
    FS_OPTIONS,
    DEVICE_CATALOG,
    RECOVERY_FSTAB,
];

/// Pulled blobs, mirroring device paths
pub const BLOBS_DIR: &str = "blobs";
/// Assembled filesystem tree
pub const CONTENT_DIR: &str = "content";
/// Output partition images
pub const IMAGES_DIR: &str = "images";

/// Per-device working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRoot {
    root: PathBuf,
}

impl StagingRoot {
    /// Use an existing directory as the staging root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root under `base` named after the archive's product token.
    ///
    /// # Errors
    ///
    /// Fails with [`ProvisionError::InvalidArchiveName`] when the file name
    /// has nothing before its first `.`.
    pub fn for_archive(base: &Path, archive: &Path) -> Result<Self> {
        let token = product_token(archive)
            .ok_or_else(|| ProvisionError::InvalidArchiveName(archive.to_path_buf()))?;
        Ok(Self::new(base.join(token)))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// A file at the staging root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn blobs(&self) -> PathBuf {
        self.root.join(BLOBS_DIR)
    }

    pub fn content(&self) -> PathBuf {
        self.root.join(CONTENT_DIR)
    }

    pub fn images(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// Mount-point directory inside `content/`, upper-cased.
    pub fn mount_dir(&self, mount: &str) -> PathBuf {
        self.content().join(mount.to_uppercase())
    }
}

/// Portion of the archive file name before its first `.`.
pub fn product_token(archive: &Path) -> Option<String> {
    let name = archive.file_name()?.to_str()?;
    let token = name.split('.').next().unwrap_or_default();
    (!token.is_empty()).then(|| token.to_string())
}

/// Create `path` as a directory if absent.
///
/// # Errors
///
/// Fails with [`ProvisionError::NotADirectory`] when `path` exists as
/// something else, or on I/O errors.
pub async fn ensure_directory(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ProvisionError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| ProvisionError::io(path, e)),
        Err(e) => Err(ProvisionError::io(path, e)),
    }
}

/// Whether `path` exists and is a directory.
pub async fn is_directory(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_dir())
}

/// Whether `path` exists.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Strip a single leading `/`.
pub fn strip_leading_separator(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Whether `path` is relative and made only of normal components, so that
/// joining it below a directory stays inside that directory.
pub fn is_contained(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
