//! Transport backed by the host's `adb` and `fastboot` binaries.
//!
//! Enumeration runs `adb devices` and, while bootloader scanning is enabled,
//! `fastboot devices`. A background watcher polls both listings and emits
//! [`TransportEvent`]s when the set of attached devices changes.

pub mod adb;
pub mod command;
pub mod fastboot;

pub use adb::AdbDevice;
pub use command::{ToolCommand, ToolError, ToolOutput};
pub use fastboot::FastbootDevice;

use crate::error::Result;
use crate::transport::{DeviceHandle, DeviceTransport, TransportEvent, TransportMode};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Paths to the host debug tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTools {
    /// `adb` binary
    pub adb: PathBuf,
    /// `fastboot` binary
    pub fastboot: PathBuf,
}

impl Default for HostTools {
    fn default() -> Self {
        Self {
            adb: PathBuf::from("adb"),
            fastboot: PathBuf::from("fastboot"),
        }
    }
}

/// Parse a device listing, keeping serials whose state equals `state`.
///
/// Devices reported as `unauthorized`, `offline` or any other state are
/// skipped, as are banner lines.
pub fn parse_device_list(output: &str, state: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let reported = tokens.next()?;
            (reported == state).then(|| serial.to_string())
        })
        .collect()
}

/// Host transport.
pub struct HostTransport {
    tools: HostTools,
    fastboot_scanning: AtomicBool,
    events: broadcast::Sender<TransportEvent>,
    channels: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HostTransport {
    /// Create a transport over the given tools.
    pub fn new(tools: HostTools) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            tools,
            fastboot_scanning: AtomicBool::new(false),
            events,
            channels: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Serials currently listed, per mode.
    ///
    /// # Errors
    ///
    /// Fails if `adb devices` cannot be run. A failing `fastboot devices`
    /// is logged and treated as an empty listing.
    pub async fn list(&self) -> Result<Vec<(String, TransportMode)>> {
        let output = ToolCommand::new(&self.tools.adb)
            .arg("devices")
            .run()
            .await
            .map_err(|e| adb::map_tool_error("host", e))?;
        let mut listed: Vec<(String, TransportMode)> = parse_device_list(&output.stdout_text(), "device")
            .into_iter()
            .map(|serial| (serial, TransportMode::Adb))
            .collect();

        if self.fastboot_scanning() {
            match ToolCommand::new(&self.tools.fastboot).arg("devices").run().await {
                Ok(output) => listed.extend(
                    parse_device_list(&output.stdout_text(), "fastboot")
                        .into_iter()
                        .map(|serial| (serial, TransportMode::Fastboot)),
                ),
                Err(e) => warn!(error = %e, "fastboot devices failed"),
            }
        }
        Ok(listed)
    }

    /// Poll the device listings every `interval` and broadcast changes.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            let mut known: BTreeSet<(String, TransportMode)> = BTreeSet::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(?interval, "Device watcher started");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let current: BTreeSet<(String, TransportMode)> = match transport.list().await {
                    Ok(listed) => listed.into_iter().collect(),
                    Err(e) => {
                        warn!(error = %e, "Device listing failed");
                        continue;
                    }
                };
                for (identifier, mode) in current.difference(&known) {
                    transport.emit(TransportEvent::Attached {
                        identifier: identifier.clone(),
                        mode: *mode,
                    });
                }
                for (identifier, mode) in known.difference(&current) {
                    transport.emit(TransportEvent::Detached {
                        identifier: identifier.clone(),
                        mode: *mode,
                    });
                }
                known = current;
            }
            debug!("Device watcher stopped");
        })
    }

    fn emit(&self, event: TransportEvent) {
        debug!(?event, "Transport change");
        if self.events.send(event).is_err() {
            debug!("No transport subscribers");
        }
    }
}

#[async_trait]
impl DeviceTransport for HostTransport {
    async fn enumerate(&self) -> Result<Vec<Arc<dyn DeviceHandle>>> {
        let listed = self.list().await?;
        let mut seen: HashMap<String, TransportMode> = HashMap::new();
        let mut handles: Vec<Arc<dyn DeviceHandle>> = Vec::with_capacity(listed.len());
        for (serial, mode) in listed {
            if seen.insert(serial.clone(), mode).is_some() {
                debug!(device = %serial, "Device listed twice, keeping first");
                continue;
            }
            let handle: Arc<dyn DeviceHandle> = match mode {
                TransportMode::Adb => {
                    let channel = self.channels.lock().entry(serial.clone()).or_default().clone();
                    Arc::new(AdbDevice::new(serial, self.tools.adb.clone(), channel))
                }
                TransportMode::Fastboot => Arc::new(FastbootDevice::new(serial, self.tools.fastboot.clone())),
            };
            handles.push(handle);
        }
        Ok(handles)
    }

    fn set_fastboot_scanning(&self, enabled: bool) {
        let previous = self.fastboot_scanning.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Bootloader scanning toggled");
        }
    }

    fn fastboot_scanning(&self) -> bool {
        self.fastboot_scanning.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
