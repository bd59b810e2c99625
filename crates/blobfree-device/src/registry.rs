//! Device registry: enumeration, classification and the ready list.
//!
//! The registry drives every discovered device through the lifecycle state
//! machine and keeps the list of devices that are ready for use. Changes to
//! that list are broadcast as [`DeviceListEvent`]s.
//!
//! Enumeration is re-run after a root elevation so the restarted daemon is
//! classified again. Re-runs are bounded by
//! [`RegistryOptions::max_elevation_passes`].

use crate::catalog::{DeviceCatalog, DeviceDescriptor};
use crate::classifier::Classifier;
use crate::error::{DeviceError, Result};
use crate::handle::{CallTimeouts, DiscoveredDevice};
use crate::lifecycle::{Effect, LifecycleEvent, LifecycleState};
use crate::transport::{DeviceTransport, TransportMode};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Registry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Timeouts for every device call
    pub timeouts: CallTimeouts,
    /// Upper bound on enumeration passes per refresh
    pub max_elevation_passes: u32,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            timeouts: CallTimeouts::default(),
            max_elevation_passes: 3,
        }
    }
}

/// A device on the ready list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadyDevice {
    /// Transport identifier
    pub identifier: String,
    /// Mode it is ready in
    pub mode: TransportMode,
    /// Display label
    pub label: String,
    /// Label of the matched descriptor
    pub descriptor: String,
}

/// Change to the ready list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceListEvent {
    /// Device became ready
    Added(ReadyDevice),
    /// Device left the ready list
    Removed {
        /// Device identifier
        identifier: String,
        /// Mode it was ready in
        mode: TransportMode,
    },
    /// Device was seen but matches no descriptor
    Unsupported {
        /// Device identifier
        identifier: String,
        /// Mode it was seen in
        mode: TransportMode,
    },
}

struct Entry {
    state: LifecycleState,
    device: DiscoveredDevice,
    ready: Option<ReadyDevice>,
    rejected: bool,
}

/// Tracks attached devices and their lifecycle.
pub struct DeviceRegistry {
    transport: Arc<dyn DeviceTransport>,
    classifier: Classifier,
    options: RegistryOptions,
    entries: Mutex<HashMap<String, Entry>>,
    events: broadcast::Sender<DeviceListEvent>,
}

impl DeviceRegistry {
    /// Create a registry over a transport and catalog.
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        catalog: Arc<DeviceCatalog>,
        options: RegistryOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            transport,
            classifier: Classifier::new(catalog),
            options,
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to ready-list changes.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceListEvent> {
        self.events.subscribe()
    }

    /// Enumerate, classify and elevate until the ready list settles.
    ///
    /// # Errors
    ///
    /// Only enumeration failures are returned. Per-device failures are
    /// logged and leave that device off the ready list.
    pub async fn refresh(&self) -> Result<Vec<ReadyDevice>> {
        let max_passes = self.options.max_elevation_passes.max(1);
        for pass in 1..=max_passes {
            let rerun = self.enumeration_pass().await?;
            if !rerun {
                break;
            }
            if pass == max_passes {
                warn!(passes = max_passes, "Re-enumeration limit reached after elevation");
            } else {
                debug!(pass, "Re-enumerating after elevation");
            }
        }
        Ok(self.ready_devices().await)
    }

    async fn enumeration_pass(&self) -> Result<bool> {
        let handles = self.transport.enumerate().await?;
        let mut seen = HashSet::new();
        let mut rerun = false;

        for handle in handles {
            let identifier = handle.identifier().to_string();
            seen.insert(identifier.clone());
            let device = self.tracked_device(handle).await;

            match self.classifier.classify(&device).await {
                Ok(descriptor) => match self.admit(&device, &descriptor).await {
                    Ok(Effect::Reenumerate) => rerun = true,
                    Ok(effect) => self.apply(effect),
                    Err(e) => warn!(device = %identifier, error = %e, "Failed to admit device"),
                },
                Err(DeviceError::Unsupported(_)) => self.reject(&device).await,
                Err(e) => warn!(device = %identifier, error = %e, "Classification failed"),
            }
        }

        self.prune(&seen).await;
        Ok(rerun)
    }

    /// Reuse the tracked handle for a device so invalidation is shared.
    async fn tracked_device(&self, handle: Arc<dyn crate::transport::DeviceHandle>) -> DiscoveredDevice {
        let entries = self.entries.lock().await;
        match entries.get(handle.identifier()) {
            Some(entry) if entry.device.mode() == handle.mode() && !entry.device.is_invalidated() => {
                entry.device.clone()
            }
            _ => DiscoveredDevice::new(handle, self.options.timeouts),
        }
    }

    async fn state_of(&self, identifier: &str) -> LifecycleState {
        self.entries
            .lock()
            .await
            .get(identifier)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    async fn admit(&self, device: &DiscoveredDevice, descriptor: &DeviceDescriptor) -> Result<Effect> {
        let state = self.state_of(device.identifier()).await;
        let identifier = device.identifier();

        match device.mode() {
            TransportMode::Adb => {
                let elevated = device.is_elevated().await?;
                let transition = state.advance(LifecycleEvent::ClassifiedAdb { elevated })?;
                if !elevated {
                    self.store(device, transition.next, None).await;
                    info!(device = %identifier, "Requesting root elevation");
                    device.elevate().await?;
                    let elevating = transition.next.advance(LifecycleEvent::Elevated)?;
                    self.store(device, elevating.next, None).await;
                    return Ok(elevating.effect);
                }

                let model = match device.model().await {
                    Ok(model) => model.trim().to_string(),
                    Err(e) => {
                        debug!(device = %identifier, error = %e, "Model query failed");
                        String::new()
                    }
                };
                let label = if model.is_empty() {
                    identifier.to_string()
                } else {
                    format!("{model} ({identifier})")
                };
                let ready = ReadyDevice {
                    identifier: identifier.to_string(),
                    mode: TransportMode::Adb,
                    label,
                    descriptor: descriptor.label(),
                };
                self.store(device, transition.next, Some(ready)).await;
                Ok(transition.effect)
            }
            TransportMode::Fastboot => {
                let transition = state.advance(LifecycleEvent::ClassifiedFastboot)?;
                let (product, serial) = tokio::join!(
                    device.get_variable("product"),
                    device.get_variable("serialno")
                );
                let product = product.map(|p| p.trim().to_string()).unwrap_or_default();
                let serial = serial
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| identifier.to_string());
                let ready = ReadyDevice {
                    identifier: identifier.to_string(),
                    mode: TransportMode::Fastboot,
                    label: format!("{product}/{serial}"),
                    descriptor: descriptor.label(),
                };
                self.store(device, transition.next, Some(ready)).await;
                Ok(transition.effect)
            }
        }
    }

    async fn store(&self, device: &DiscoveredDevice, state: LifecycleState, ready: Option<ReadyDevice>) {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(
            device.identifier().to_string(),
            Entry {
                state,
                device: device.clone(),
                ready: ready.clone(),
                rejected: false,
            },
        );
        let previous_ready = previous.and_then(|entry| entry.ready);
        if previous_ready == ready {
            return;
        }
        if let Some(old) = previous_ready {
            self.emit(DeviceListEvent::Removed {
                identifier: old.identifier,
                mode: old.mode,
            });
        }
        if let Some(ready) = ready {
            info!(device = %ready.identifier, mode = %ready.mode, label = %ready.label, "Device ready");
            self.emit(DeviceListEvent::Added(ready));
        }
    }

    async fn reject(&self, device: &DiscoveredDevice) {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(
            device.identifier().to_string(),
            Entry {
                state: LifecycleState::Unclassified,
                device: device.clone(),
                ready: None,
                rejected: true,
            },
        );
        let already_rejected = previous.as_ref().is_some_and(|entry| entry.rejected);
        if let Some(old) = previous.and_then(|entry| entry.ready) {
            self.emit(DeviceListEvent::Removed {
                identifier: old.identifier,
                mode: old.mode,
            });
        }
        if !already_rejected {
            warn!(device = %device.identifier(), mode = %device.mode(), "Unsupported device");
            self.emit(DeviceListEvent::Unsupported {
                identifier: device.identifier().to_string(),
                mode: device.mode(),
            });
        }
    }

    async fn prune(&self, seen: &HashSet<String>) {
        let mut entries = self.entries.lock().await;
        let gone: Vec<String> = entries
            .keys()
            .filter(|identifier| !seen.contains(*identifier))
            .cloned()
            .collect();
        for identifier in gone {
            let Some(entry) = entries.remove(&identifier) else {
                continue;
            };
            debug!(device = %identifier, state = ?entry.state, "Device detached");
            entry.device.invalidate();
            if let Some(old) = entry.ready {
                self.emit(DeviceListEvent::Removed {
                    identifier: old.identifier,
                    mode: old.mode,
                });
            }
        }
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::StartFastbootScan => self.transport.set_fastboot_scanning(true),
            Effect::StopFastbootScan => self.transport.set_fastboot_scanning(false),
            Effect::Reenumerate | Effect::None => {}
        }
    }

    fn emit(&self, event: DeviceListEvent) {
        if self.events.send(event).is_err() {
            trace!("No device list subscribers");
        }
    }

    /// Devices currently on the ready list, sorted by identifier.
    pub async fn ready_devices(&self) -> Vec<ReadyDevice> {
        let entries = self.entries.lock().await;
        let mut ready: Vec<ReadyDevice> = entries.values().filter_map(|entry| entry.ready.clone()).collect();
        ready.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        ready
    }

    /// Lifecycle state of a tracked device.
    pub async fn state(&self, identifier: &str) -> Option<LifecycleState> {
        self.entries.lock().await.get(identifier).map(|entry| entry.state)
    }

    /// Guarded handle for a device on the ready list.
    pub async fn device(&self, identifier: &str) -> Option<DiscoveredDevice> {
        self.entries
            .lock()
            .await
            .get(identifier)
            .filter(|entry| entry.ready.is_some())
            .map(|entry| entry.device.clone())
    }

    /// Pick a ready ADB device, optionally by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] when no ready ADB device matches.
    pub async fn select_adb(&self, identifier: Option<&str>) -> Result<(DiscoveredDevice, ReadyDevice)> {
        let entries = self.entries.lock().await;
        let mut candidates: Vec<(&String, &Entry)> = entries
            .iter()
            .filter(|(_, entry)| entry.state == LifecycleState::AdbReady && entry.ready.is_some())
            .filter(|(id, _)| identifier.is_none_or(|wanted| wanted == id.as_str()))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(b.0));

        candidates
            .into_iter()
            .find_map(|(_, entry)| entry.ready.clone().map(|ready| (entry.device.clone(), ready)))
            .ok_or_else(|| DeviceError::not_found(identifier.unwrap_or("any ready ADB device")))
    }

    /// Reboot a ready ADB device into the bootloader.
    ///
    /// The device leaves the ready list, bootloader scanning is enabled and
    /// the device's handle is invalidated before the reboot is issued. A
    /// device still listed over ADB afterwards is classified again on the
    /// next refresh.
    ///
    /// # Errors
    ///
    /// Fails if the device is unknown, not ready in ADB mode, or the reboot
    /// command fails. A failed reboot forgets the device so the next refresh
    /// starts over.
    pub async fn reboot_to_bootloader(&self, identifier: &str) -> Result<()> {
        let device = self
            .begin_transition(identifier, TransportMode::Adb, LifecycleEvent::RebootToBootloader)
            .await?;
        info!(device = %identifier, "Rebooting to bootloader");
        let outcome = device.reboot_to_bootloader().await;
        if let Err(e) = &outcome {
            warn!(device = %identifier, error = %e, "Reboot to bootloader failed");
            self.forget(&device).await;
        }
        outcome
    }

    /// Drop the entry still holding `device`.
    async fn forget(&self, device: &DiscoveredDevice) {
        let mut entries = self.entries.lock().await;
        let held = entries
            .get(device.identifier())
            .is_some_and(|entry| entry.device.mode() == device.mode());
        if held {
            entries.remove(device.identifier());
        }
    }

    /// Reboot a ready bootloader-mode device into the normal OS.
    ///
    /// Bootloader scanning is disabled once the reboot command completes.
    ///
    /// # Errors
    ///
    /// Fails if the device is unknown, not ready in bootloader mode, or the
    /// reboot command fails.
    pub async fn reboot_to_normal(&self, identifier: &str) -> Result<()> {
        let device = self
            .begin_transition(identifier, TransportMode::Fastboot, LifecycleEvent::RebootToNormal)
            .await?;
        info!(device = %identifier, "Rebooting to system");
        let outcome = device.reboot_to_normal().await;
        self.apply(Effect::StopFastbootScan);
        outcome
    }

    async fn begin_transition(
        &self,
        identifier: &str,
        mode: TransportMode,
        event: LifecycleEvent,
    ) -> Result<DiscoveredDevice> {
        let (device, transition) = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .get_mut(identifier)
                .ok_or_else(|| DeviceError::not_found(identifier))?;
            if entry.device.mode() != mode || entry.ready.is_none() {
                return Err(DeviceError::not_ready(
                    identifier,
                    format!("not ready in {mode} mode"),
                ));
            }
            let transition = entry.state.advance(event)?;
            entry.state = transition.next;
            let old = entry.ready.take();
            let device = entry.device.clone();
            if transition.next == LifecycleState::Unclassified {
                entries.remove(identifier);
            }
            if let Some(old) = old {
                self.emit(DeviceListEvent::Removed {
                    identifier: old.identifier,
                    mode: old.mode,
                });
            }
            (device, transition)
        };
        if transition.effect == Effect::StartFastbootScan {
            self.apply(transition.effect);
        }
        Ok(device)
    }

    /// Refresh on every transport event until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Fails if the initial enumeration fails.
    pub async fn watch(&self, shutdown: CancellationToken) -> Result<()> {
        let mut events = self.transport.subscribe();
        self.refresh().await?;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        debug!(?event, "Transport event");
                        if let Err(e) = self.refresh().await {
                            warn!(error = %e, "Refresh after transport event failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Transport events lagged, refreshing");
                        if let Err(e) = self.refresh().await {
                            warn!(error = %e, "Refresh after lag failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }
}
