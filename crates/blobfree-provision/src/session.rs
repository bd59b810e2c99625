//! Provisioning session
//!
//! Runs the stages in order: extract, classify, acquire, inject, resolve
//! the fstab, assemble. Each stage consumes the previous one's output, so
//! nothing here runs concurrently except the partition builds inside
//! assembly.

use crate::acquire::{AcquisitionReport, BlobAcquirer};
use crate::archive::{ArchiveCodec, ZipCodec};
use crate::assembly::{self, AssemblyReport, HostToolchain, ImageAssembler, ImageToolchain};
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::extract::{self, DistributionExtractor, ExtractedDistribution};
use crate::fstab::{self, BuildTasks};
use crate::inject::{self, InjectionReport};
use crate::layout::{BLOBS_MANIFEST, FS_OPTIONS, RECOVERY_FSTAB, StagingRoot};
use crate::manifest::BlobMapping;
use crate::progress::AcquisitionEvent;
use blobfree_device::{DeviceError, DeviceRegistry, DeviceTransport, HostTransport, ReadyDevice};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Results of the stages that run on a staged root.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub injection: InjectionReport,
    pub tasks: BuildTasks,
    pub assembly: AssemblyReport,
}

/// Results of a whole session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub staging_root: PathBuf,
    /// Device the blobs came from
    pub device: ReadyDevice,
    pub acquisition: AcquisitionReport,
    #[serde(flatten)]
    pub build: BuildReport,
}

/// One provisioning run over injected collaborators.
pub struct ProvisioningSession {
    config: ProvisionConfig,
    transport: Arc<dyn DeviceTransport>,
    codec: Arc<dyn ArchiveCodec>,
    toolchain: Arc<dyn ImageToolchain>,
    acquirer: BlobAcquirer,
}

impl ProvisioningSession {
    pub fn new(
        config: ProvisionConfig,
        transport: Arc<dyn DeviceTransport>,
        codec: Arc<dyn ArchiveCodec>,
        toolchain: Arc<dyn ImageToolchain>,
    ) -> Self {
        Self {
            config,
            transport,
            codec,
            toolchain,
            acquirer: BlobAcquirer::new(),
        }
    }

    /// Session over the host tools named in `config`.
    pub fn from_config(config: ProvisionConfig) -> Self {
        let transport = Arc::new(HostTransport::new(config.host_tools()));
        let toolchain = Arc::new(HostToolchain::from_config(&config));
        Self::new(config, transport, Arc::new(ZipCodec), toolchain)
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Subscribe to blob acquisition progress.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.acquirer.subscribe()
    }

    /// Unpack `archive` into its staging root.
    ///
    /// # Errors
    ///
    /// See [`DistributionExtractor::extract`].
    pub async fn extract(&self, archive: &Path) -> Result<ExtractedDistribution> {
        DistributionExtractor::new(Arc::clone(&self.codec), &self.config.staging_base)
            .extract(archive)
            .await
    }

    /// Run every stage for `archive`, pulling blobs from the ready ADB
    /// device `serial`, or the first one when `None`.
    ///
    /// # Errors
    ///
    /// Fails on any session-fatal condition: an invalid distribution, no
    /// ready device, a device that is not elevated, a lost device handle or
    /// a staging path that is not a directory. Per-blob and per-partition
    /// failures are reported in the [`SessionReport`].
    pub async fn run(&self, archive: &Path, serial: Option<&str>) -> Result<SessionReport> {
        info!(archive = %archive.display(), serial = ?serial, "Starting provisioning session");
        let distribution = self.extract(archive).await?;
        let root = distribution.root;

        let registry = DeviceRegistry::new(
            Arc::clone(&self.transport),
            distribution.catalog,
            self.config.registry_options(),
        );
        let ready = registry.refresh().await?;
        info!(ready = ready.len(), "Device enumeration complete");

        let (device, ready_device) = registry.select_adb(serial).await.map_err(|e| match e {
            DeviceError::NotFound(_) => ProvisionError::NoReadyDevice,
            other => other.into(),
        })?;
        info!(device = %ready_device.label, descriptor = %ready_device.descriptor, "Using device");

        let mapping = BlobMapping::load(&root.file(BLOBS_MANIFEST)).await?;
        let acquisition = self.acquirer.acquire(&device, &root, &mapping).await?;
        let build = self.build_with_mapping(&root, &mapping).await?;

        Ok(SessionReport {
            staging_root: root.path().to_path_buf(),
            device: ready_device,
            acquisition,
            build,
        })
    }

    /// Inject cached blobs and build images on an already staged root.
    ///
    /// # Errors
    ///
    /// Fails if the staged root lacks a required file or a staging path is
    /// not a directory.
    pub async fn inject_and_build(&self, root: &StagingRoot) -> Result<BuildReport> {
        extract::verify_required_files(root).await?;
        let mapping = BlobMapping::load(&root.file(BLOBS_MANIFEST)).await?;
        self.build_with_mapping(root, &mapping).await
    }

    async fn build_with_mapping(&self, root: &StagingRoot, mapping: &BlobMapping) -> Result<BuildReport> {
        let entries = fstab::load_fstab(&root.file(RECOVERY_FSTAB)).await?;
        let mounts = fstab::staged_mounts(root, &entries).await;
        let injection = inject::inject_blobs(root, mapping, &mounts).await?;

        let tasks = fstab::resolve_build_tasks(root, &entries).await;
        info!(images = ?tasks.image_names(), "Resolved build tasks");

        let options = assembly::load_fs_options(&root.file(FS_OPTIONS)).await?;
        let assembly = ImageAssembler::new(Arc::clone(&self.toolchain))
            .with_fs_options(options)
            .assemble(root, &tasks)
            .await?;

        Ok(BuildReport {
            injection,
            tasks,
            assembly,
        })
    }
}
