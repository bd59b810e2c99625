//! Distribution extraction
//!
//! Unpacks a distribution archive into its staging root, checks the required
//! root files, loads the device catalog and unpacks the nested content
//! archive into `content/`.

use crate::archive::{ArchiveCodec, ExtractPolicy};
use crate::error::{ProvisionError, Result};
use crate::layout::{self, BLOB_FREE_ARCHIVE, DEVICE_CATALOG, REQUIRED_FILES, StagingRoot};
use blobfree_device::DeviceCatalog;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A distribution unpacked into its staging root.
#[derive(Debug, Clone)]
pub struct ExtractedDistribution {
    /// Staging root
    pub root: StagingRoot,
    /// Supported-device catalog from `devices.json`
    pub catalog: Arc<DeviceCatalog>,
}

/// Unpacks distribution archives below a staging base directory.
pub struct DistributionExtractor {
    codec: Arc<dyn ArchiveCodec>,
    staging_base: PathBuf,
}

impl DistributionExtractor {
    pub fn new(codec: Arc<dyn ArchiveCodec>, staging_base: impl Into<PathBuf>) -> Self {
        Self {
            codec,
            staging_base: staging_base.into(),
        }
    }

    /// Extract `archive` and load its catalog.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal to the session: an archive name without a
    /// product token, a staging path that is not a directory, an unreadable
    /// archive, a missing required file or an unparsable catalog.
    pub async fn extract(&self, archive: &Path) -> Result<ExtractedDistribution> {
        let root = StagingRoot::for_archive(&self.staging_base, archive)?;
        info!(archive = %archive.display(), root = %root.path().display(), "Extracting distribution");

        layout::ensure_directory(root.path()).await?;
        self.codec
            .extract(archive, root.path(), ExtractPolicy::Overwrite)
            .await?;
        verify_required_files(&root).await?;

        let catalog = DeviceCatalog::load(&root.file(DEVICE_CATALOG)).await?;
        info!(descriptors = catalog.len(), "Loaded device catalog");

        self.extract_content(&root).await?;
        Ok(ExtractedDistribution {
            root,
            catalog: Arc::new(catalog),
        })
    }

    /// Unpack the nested content archive into `content/`, keeping files
    /// already present.
    ///
    /// # Errors
    ///
    /// Fails if `content/` exists as a non-directory or the nested archive
    /// cannot be unpacked.
    pub async fn extract_content(&self, root: &StagingRoot) -> Result<()> {
        let content = root.content();
        layout::ensure_directory(&content).await?;
        let summary = self
            .codec
            .extract(&root.file(BLOB_FREE_ARCHIVE), &content, ExtractPolicy::KeepExisting)
            .await?;
        debug!(files = summary.files, kept = summary.kept, "Content tree unpacked");
        Ok(())
    }
}

/// Check every required root file is present.
///
/// # Errors
///
/// Returns [`ProvisionError::MissingManifest`] naming the first missing file.
pub async fn verify_required_files(root: &StagingRoot) -> Result<()> {
    for name in REQUIRED_FILES {
        let path = root.file(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(ProvisionError::MissingManifest(name.to_string())),
        }
    }
    Ok(())
}
