//! Shared fixtures for provisioning integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use blobfree_device::{CallTimeouts, DiscoveredDevice};
use blobfree_provision::assembly::{BootImageRequest, ImageToolchain, WorkerRequest, WorkerResponse};
use blobfree_provision::prelude::*;
use blobfree_provision::{DistributionExtractor, ExtractedDistribution};
use blobfree_test_helpers::prelude::*;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Elevated sample device matching the sample catalog.
pub fn widget(serial: &str) -> MockDevice {
    MockDevice::adb(serial)
        .with_property("ro.product.device", "widget")
        .with_property("ro.product.model", "Widget One")
        .elevated(true)
}

pub fn discovered(device: &MockDevice) -> DiscoveredDevice {
    DiscoveredDevice::new(Arc::new(device.clone()), CallTimeouts::default())
}

/// Extract `fixture` as `acme_widget.42.zip` below `dir/staging`.
pub async fn stage(dir: &Path, fixture: &DistributionFixture) -> Result<ExtractedDistribution, ProvisionError> {
    let archive = fixture.write_to(dir, "acme_widget.42.zip");
    DistributionExtractor::new(Arc::new(ZipCodec), dir.join("staging"))
        .extract(&archive)
        .await
}

#[derive(Debug, Default)]
struct Recorded {
    ramdisks: Vec<String>,
    boot_requests: Vec<BootImageRequest>,
    fs_requests: Vec<WorkerRequest>,
}

/// Image builders that write placeholder files and record their inputs.
pub struct FakeToolchain {
    recorded: Mutex<Recorded>,
    fail_system: bool,
    system_delay: Duration,
    boot_waits_for_system: bool,
    system_started: watch::Sender<bool>,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        let (system_started, _) = watch::channel(false);
        Self {
            recorded: Mutex::new(Recorded::default()),
            fail_system: false,
            system_delay: Duration::ZERO,
            boot_waits_for_system: false,
            system_started,
        }
    }
}

impl FakeToolchain {
    pub fn failing_system() -> Self {
        Self {
            fail_system: true,
            ..Self::default()
        }
    }

    /// Boot image writes block until the system build has started.
    pub fn interleaved(system_delay: Duration) -> Self {
        Self {
            system_delay,
            boot_waits_for_system: true,
            ..Self::default()
        }
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ramdisks(&self) -> Vec<String> {
        self.recorded().ramdisks.clone()
    }

    pub fn boot_requests(&self) -> Vec<BootImageRequest> {
        self.recorded().boot_requests.clone()
    }

    pub fn fs_requests(&self) -> Vec<WorkerRequest> {
        self.recorded().fs_requests.clone()
    }
}

#[async_trait]
impl ImageToolchain for FakeToolchain {
    async fn pack_ramdisk(&self, ramdisk_dir: &Path) -> Result<Vec<u8>, AssemblyError> {
        let name = ramdisk_dir.display().to_string();
        self.recorded().ramdisks.push(name.clone());
        Ok(format!("cpio:{name}").into_bytes())
    }

    async fn write_boot_image(&self, request: &BootImageRequest) -> Result<(), AssemblyError> {
        if self.boot_waits_for_system {
            let mut started = self.system_started.subscribe();
            let waited = tokio::time::timeout(Duration::from_secs(5), started.wait_for(|s| *s)).await;
            if waited.is_err() {
                return Err(AssemblyError::ToolFailed {
                    tool: "fake-mkbootimg".into(),
                    message: "system build never started".into(),
                });
            }
        }
        self.recorded().boot_requests.push(request.clone());
        tokio::fs::write(&request.output, b"ANDROID!")
            .await
            .map_err(|e| AssemblyError::Io {
                path: request.output.clone(),
                message: e.to_string(),
            })
    }

    async fn build_filesystem(&self, request: &WorkerRequest) -> WorkerResponse {
        self.system_started.send_replace(true);
        self.recorded().fs_requests.push(request.clone());
        if !self.system_delay.is_zero() {
            tokio::time::sleep(self.system_delay).await;
        }
        if self.fail_system {
            return WorkerResponse {
                done: true,
                result: false,
                message: Some("make_ext4fs exited with status 1".into()),
            };
        }
        let written = tokio::fs::write(&request.image, b"EXT4").await.is_ok();
        WorkerResponse {
            done: true,
            result: written,
            message: None,
        }
    }
}
