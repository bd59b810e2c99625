//! `extract`: stage a distribution without touching any device

use anyhow::{Context, Result};
use blobfree_provision::{DistributionExtractor, ProvisionConfig, ZipCodec};
use std::path::Path;
use std::sync::Arc;

use crate::output;

/// Execute extract command
pub async fn execute(config: &ProvisionConfig, archive: &Path, json: bool) -> Result<()> {
    let extractor = DistributionExtractor::new(Arc::new(ZipCodec), config.staging_base.clone());
    let staged = extractor
        .extract(archive)
        .await
        .with_context(|| format!("Extraction of {} failed", archive.display()))?;
    output::print_staged(&staged.root, staged.catalog.len(), json);
    Ok(())
}
