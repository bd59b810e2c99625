//! `provision`: the whole pipeline from archive to partition images

use anyhow::{Context, Result};
use blobfree_provision::{AcquisitionEvent, ProvisionConfig, ProvisioningSession};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::output;

/// Execute provision command
pub async fn execute(config: ProvisionConfig, archive: &Path, serial: Option<&str>, json: bool) -> Result<()> {
    let session = ProvisioningSession::from_config(config);

    let done = CancellationToken::new();
    let progress = (!json).then(|| tokio::spawn(render_progress(session.subscribe_progress(), done.clone())));

    let result = session
        .run(archive, serial)
        .await
        .with_context(|| format!("Provisioning from {} failed", archive.display()));

    done.cancel();
    if let Some(handle) = progress
        && let Err(e) = handle.await
    {
        tracing::debug!(error = %e, "Progress renderer ended abnormally");
    }

    let report = result?;
    output::print_session_report(&report, json);

    let failed = report.build.assembly.failed();
    if !failed.is_empty() {
        return Err(CliError::PartitionFailed(failed.into_iter().map(str::to_string).collect()).into());
    }
    Ok(())
}

async fn render_progress(mut events: broadcast::Receiver<AcquisitionEvent>, done: CancellationToken) {
    let pb = ProgressBar::hidden();
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);

    loop {
        let event = tokio::select! {
            () = done.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(AcquisitionEvent::Started { total }) => {
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb.set_length(u64::try_from(total).unwrap_or(u64::MAX));
                pb.set_position(0);
                pb.set_message("Pulling blobs");
            }
            Ok(AcquisitionEvent::Progress(update)) => {
                pb.set_position(u64::try_from(update.index.saturating_sub(1)).unwrap_or(u64::MAX));
                pb.set_message(update.label);
            }
            Ok(AcquisitionEvent::Failed { source, message }) => {
                pb.println(format!("  ✗ {source}: {message}"));
            }
            Ok(AcquisitionEvent::Completed { fetched, failed }) => {
                pb.set_position(pb.length().unwrap_or_default());
                pb.finish_with_message(format!("{fetched} fetched, {failed} failed"));
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    if !pb.is_finished() {
        pb.finish_and_clear();
    }
}
