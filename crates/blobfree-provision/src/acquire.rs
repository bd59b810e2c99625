//! Blob acquisition
//!
//! Diffs the blob mapping against `blobs/` and pulls every missing blob from
//! the device. The device has one transfer channel, so pulls go through a
//! [`PullQueue`] drained by a single worker: one pull in flight at a time.
//!
//! A failed pull leaves its blob missing and the batch carries on. Only a
//! lost device handle (mode switch or detach) aborts the batch.

use crate::error::{ProvisionError, Result};
use crate::layout::{self, StagingRoot};
use crate::manifest::BlobMapping;
use crate::progress::{AcquisitionEvent, ProgressUpdate};
use blobfree_device::{DeviceError, DiscoveredDevice, TransportMode};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// One blob to pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchItem {
    /// Normalized source path
    pub source: String,
    /// Device-absolute path passed to the pull
    pub remote: String,
    /// Destination below `blobs/`
    pub local: PathBuf,
}

/// A missing blob whose destination directory could not be prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unplaceable {
    pub source: String,
    pub message: String,
}

/// Blobs to pull, plus those already cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// Missing blobs in first-seen order
    pub items: Vec<FetchItem>,
    /// Sources already present in `blobs/`
    pub already_cached: Vec<String>,
    /// Missing blobs with nowhere to land
    pub unplaceable: Vec<Unplaceable>,
}

impl FetchPlan {
    /// Source paths of the fetch list.
    pub fn sources(&self) -> Vec<String> {
        self.items.iter().map(|item| item.source.clone()).collect()
    }
}

/// Build the fetch list, creating destination directories in `blobs/`.
///
/// An entry whose directory cannot be created is set aside in
/// [`FetchPlan::unplaceable`] and the rest are still planned.
///
/// # Errors
///
/// Fails only if `blobs/` itself cannot be prepared.
pub async fn plan_fetch(root: &StagingRoot, mapping: &BlobMapping) -> Result<FetchPlan> {
    let blobs = root.blobs();
    layout::ensure_directory(&blobs).await?;

    let mut plan = FetchPlan::default();
    for entry in mapping.entries() {
        let local = blobs.join(&entry.source);
        if let Some(parent) = local.parent()
            && let Err(e) = layout::ensure_directory(parent).await
        {
            warn!(blob = %entry.source, error = %e, "Cannot prepare blob destination");
            plan.unplaceable.push(Unplaceable {
                source: entry.source.clone(),
                message: e.to_string(),
            });
            continue;
        }
        if layout::exists(&local).await {
            trace!(blob = %entry.source, "Blob already cached");
            plan.already_cached.push(entry.source.clone());
        } else {
            plan.items.push(FetchItem {
                source: entry.source.clone(),
                remote: entry.remote_path(),
                local,
            });
        }
    }
    Ok(plan)
}

/// FIFO of pending pulls, consumed by one worker.
#[derive(Debug, Default)]
pub struct PullQueue {
    pending: VecDeque<FetchItem>,
    total: usize,
    issued: usize,
}

impl PullQueue {
    pub fn new(items: impl IntoIterator<Item = FetchItem>) -> Self {
        let pending: VecDeque<FetchItem> = items.into_iter().collect();
        Self {
            total: pending.len(),
            pending,
            issued: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Next item with its progress position.
    pub fn next_item(&mut self) -> Option<(ProgressUpdate, FetchItem)> {
        let item = self.pending.pop_front()?;
        self.issued = self.issued.saturating_add(1);
        let update = ProgressUpdate {
            index: self.issued,
            total: self.total,
            label: item.source.clone(),
        };
        Some((update, item))
    }
}

/// Outcome of one acquisition batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionReport {
    /// Sources that were missing when the batch started, pullable ones first
    pub requested: Vec<String>,
    /// Sources pulled in this batch
    pub fetched: Vec<String>,
    /// Sources whose pull failed
    pub failed: Vec<String>,
    /// Sources already in `blobs/`
    pub already_cached: Vec<String>,
}

/// Pulls missing blobs from a device.
pub struct BlobAcquirer {
    events: broadcast::Sender<AcquisitionEvent>,
}

impl Default for BlobAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobAcquirer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { events }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.events.subscribe()
    }

    /// Pull every blob of `mapping` missing from `root`.
    ///
    /// # Errors
    ///
    /// Fails before any pull if the device is not in ADB mode or not
    /// elevated, if `blobs/` cannot be prepared, or during the batch if the
    /// device handle is lost. Individual pull failures and blobs without a
    /// usable destination are reported in [`AcquisitionReport::failed`].
    pub async fn acquire(
        &self,
        device: &DiscoveredDevice,
        root: &StagingRoot,
        mapping: &BlobMapping,
    ) -> Result<AcquisitionReport> {
        if device.mode() != TransportMode::Adb {
            return Err(ProvisionError::NotAdb(device.identifier().to_string()));
        }
        if !device.is_elevated().await? {
            return Err(ProvisionError::NotElevated(device.identifier().to_string()));
        }

        let plan = plan_fetch(root, mapping).await?;
        let mut report = AcquisitionReport {
            requested: plan.sources(),
            already_cached: plan.already_cached,
            ..AcquisitionReport::default()
        };
        report
            .requested
            .extend(plan.unplaceable.iter().map(|blocked| blocked.source.clone()));

        let mut queue = PullQueue::new(plan.items);
        info!(
            device = %device.identifier(),
            missing = queue.total(),
            cached = report.already_cached.len(),
            "Acquiring blobs"
        );
        self.emit(AcquisitionEvent::Started { total: queue.total() });
        for blocked in plan.unplaceable {
            self.emit(AcquisitionEvent::Failed {
                source: blocked.source.clone(),
                message: blocked.message,
            });
            report.failed.push(blocked.source);
        }

        while let Some((update, item)) = queue.next_item() {
            debug!(blob = %item.source, index = update.index, total = update.total, "Pulling blob");
            self.emit(AcquisitionEvent::Progress(update));

            match pull_one(device, &item).await {
                Ok(()) => report.fetched.push(item.source),
                Err(PullFailure::Fatal(e)) => {
                    warn!(device = %device.identifier(), error = %e, "Device lost during acquisition");
                    return Err(e.into());
                }
                Err(PullFailure::Blob(message)) => {
                    warn!(blob = %item.source, error = %message, "Blob pull failed");
                    self.emit(AcquisitionEvent::Failed {
                        source: item.source.clone(),
                        message,
                    });
                    report.failed.push(item.source);
                }
            }
        }

        info!(
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            "Blob acquisition complete"
        );
        self.emit(AcquisitionEvent::Completed {
            fetched: report.fetched.len(),
            failed: report.failed.len(),
        });
        Ok(report)
    }

    fn emit(&self, event: AcquisitionEvent) {
        if self.events.send(event).is_err() {
            trace!("No acquisition progress subscribers");
        }
    }
}

enum PullFailure {
    Fatal(DeviceError),
    Blob(String),
}

async fn pull_one(device: &DiscoveredDevice, item: &FetchItem) -> std::result::Result<(), PullFailure> {
    let partial = partial_path(&item.local);
    match device.pull(&item.remote, &partial).await {
        Ok(()) => {}
        Err(e) => {
            discard(&partial).await;
            return Err(if e.is_handle_lost() {
                PullFailure::Fatal(e)
            } else {
                PullFailure::Blob(e.to_string())
            });
        }
    }

    if !layout::exists(&partial).await {
        return Err(PullFailure::Blob("pull reported success but wrote no file".to_string()));
    }
    tokio::fs::rename(&partial, &item.local).await.map_err(|e| {
        PullFailure::Blob(format!("failed to move {} into place: {e}", partial.display()))
    })
}

fn partial_path(local: &Path) -> PathBuf {
    let mut name = local.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        debug!(path = %path.display(), error = %e, "Could not remove partial blob");
    }
}
