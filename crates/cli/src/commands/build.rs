//! `build`: inject cached blobs and assemble images on a staged root

use anyhow::{Context, Result};
use blobfree_provision::{ProvisionConfig, ProvisioningSession, StagingRoot};
use std::path::Path;

use crate::error::CliError;
use crate::output;

/// Execute build command
pub async fn execute(config: ProvisionConfig, staging_root: &Path, json: bool) -> Result<()> {
    let session = ProvisioningSession::from_config(config);
    let root = StagingRoot::new(staging_root);

    let report = session
        .inject_and_build(&root)
        .await
        .with_context(|| format!("Build on {} failed", staging_root.display()))?;
    output::print_build_report(&report, json);

    let failed = report.assembly.failed();
    if !failed.is_empty() {
        return Err(CliError::PartitionFailed(failed.into_iter().map(str::to_string).collect()).into());
    }
    Ok(())
}
