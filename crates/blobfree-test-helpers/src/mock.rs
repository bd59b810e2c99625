//! Scripted devices and transport.
//!
//! [`MockDevice`] answers property dumps, bootloader variables and pulls
//! from in-memory tables and records every call. [`MockTransport`] holds a
//! mutable set of devices and honours the bootloader scanning switch.

use async_trait::async_trait;
use blobfree_device::error::{DeviceError, Result};
use blobfree_device::transport::{DeviceHandle, DeviceTransport, TransportEvent, TransportMode};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Default)]
struct MockState {
    properties: BTreeMap<String, String>,
    variables: HashMap<String, String>,
    elevated: bool,
    refuse_elevation: bool,
    refuse_reboot: bool,
    remote_files: HashMap<String, Vec<u8>>,
    failing_pulls: HashSet<String>,
    pull_delay: Duration,
    query_delay: Duration,
    calls: Vec<String>,
    pulls: Vec<String>,
    pulls_in_flight: usize,
    max_pulls_in_flight: usize,
}

/// In-memory device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    serial: String,
    mode: TransportMode,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Device attached over the debug bridge.
    pub fn adb(serial: &str) -> Self {
        Self::new(serial, TransportMode::Adb)
    }

    /// Device attached in bootloader mode.
    pub fn fastboot(serial: &str) -> Self {
        Self::new(serial, TransportMode::Fastboot)
    }

    fn new(serial: &str, mode: TransportMode) -> Self {
        Self {
            serial: serial.to_string(),
            mode,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_property(self, key: &str, value: &str) -> Self {
        self.state.lock().properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_variable(self, name: &str, value: &str) -> Self {
        self.state.lock().variables.insert(name.to_string(), value.to_string());
        self
    }

    pub fn elevated(self, elevated: bool) -> Self {
        self.state.lock().elevated = elevated;
        self
    }

    /// `elevate` succeeds but the shell stays unprivileged.
    pub fn refusing_elevation(self) -> Self {
        self.state.lock().refuse_elevation = true;
        self
    }

    /// Reboot commands fail.
    pub fn refusing_reboot(self) -> Self {
        self.state.lock().refuse_reboot = true;
        self
    }

    pub fn with_remote_file(self, path: &str, data: &[u8]) -> Self {
        self.state.lock().remote_files.insert(path.to_string(), data.to_vec());
        self
    }

    pub fn with_failing_pull(self, path: &str) -> Self {
        self.state.lock().failing_pulls.insert(path.to_string());
        self
    }

    pub fn with_pull_delay(self, delay: Duration) -> Self {
        self.state.lock().pull_delay = delay;
        self
    }

    pub fn with_query_delay(self, delay: Duration) -> Self {
        self.state.lock().query_delay = delay;
        self
    }

    /// Every call made, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Remote paths pulled successfully, in order.
    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().pulls.clone()
    }

    /// Highest number of concurrent pulls observed.
    pub fn max_pulls_in_flight(&self) -> usize {
        self.state.lock().max_pulls_in_flight
    }

    pub fn is_root(&self) -> bool {
        self.state.lock().elevated
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }

    fn command_failed(&self, command: &str, message: &str) -> DeviceError {
        DeviceError::CommandFailed {
            device: self.serial.clone(),
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    async fn query_delay(&self) {
        let delay = self.state.lock().query_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn require(&self, mode: TransportMode, operation: &str) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(DeviceError::wrong_mode(&self.serial, operation, self.mode))
        }
    }
}

struct InFlight(Arc<Mutex<MockState>>);

impl InFlight {
    fn enter(state: &Arc<Mutex<MockState>>) -> Self {
        let mut guard = state.lock();
        guard.pulls_in_flight += 1;
        guard.max_pulls_in_flight = guard.max_pulls_in_flight.max(guard.pulls_in_flight);
        Self(Arc::clone(state))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut guard = self.0.lock();
        guard.pulls_in_flight = guard.pulls_in_flight.saturating_sub(1);
    }
}

#[async_trait]
impl DeviceHandle for MockDevice {
    fn identifier(&self) -> &str {
        &self.serial
    }

    fn mode(&self) -> TransportMode {
        self.mode
    }

    async fn is_elevated(&self) -> Result<bool> {
        self.require(TransportMode::Adb, "is_elevated")?;
        self.record("is_elevated".to_string());
        self.query_delay().await;
        Ok(self.state.lock().elevated)
    }

    async fn elevate(&self) -> Result<()> {
        self.require(TransportMode::Adb, "elevate")?;
        self.record("elevate".to_string());
        let mut state = self.state.lock();
        if !state.refuse_elevation {
            state.elevated = true;
        }
        Ok(())
    }

    async fn shell(&self, command: &str) -> Result<String> {
        self.require(TransportMode::Adb, "shell")?;
        self.record(format!("shell {command}"));
        self.query_delay().await;
        let state = self.state.lock();
        match command {
            "getprop" => Ok(state
                .properties
                .iter()
                .map(|(k, v)| format!("[{k}]: [{v}]\n"))
                .collect()),
            "id -u" => Ok(if state.elevated { "0\n" } else { "2000\n" }.to_string()),
            _ => Ok(String::new()),
        }
    }

    async fn get_variable(&self, name: &str) -> Result<String> {
        self.require(TransportMode::Fastboot, "getvar")?;
        self.record(format!("getvar {name}"));
        self.query_delay().await;
        let value = self.state.lock().variables.get(name).cloned();
        value.ok_or_else(|| self.command_failed(&format!("getvar {name}"), "variable not reported"))
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        self.require(TransportMode::Adb, "pull")?;
        self.record(format!("pull {remote}"));
        let _in_flight = InFlight::enter(&self.state);

        let delay = self.state.lock().pull_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let data = {
            let state = self.state.lock();
            if state.failing_pulls.contains(remote) {
                return Err(self.command_failed(&format!("pull {remote}"), "Permission denied"));
            }
            state.remote_files.get(remote).cloned()
        };
        let Some(data) = data else {
            return Err(self.command_failed(&format!("pull {remote}"), "remote object does not exist"));
        };
        tokio::fs::write(local, data)
            .await
            .map_err(|e| self.command_failed(&format!("pull {remote}"), &e.to_string()))?;
        self.state.lock().pulls.push(remote.to_string());
        Ok(())
    }

    async fn model(&self) -> Result<String> {
        self.record("model".to_string());
        let state = self.state.lock();
        let model = match self.mode {
            TransportMode::Adb => state.properties.get("ro.product.model"),
            TransportMode::Fastboot => state.variables.get("product"),
        };
        Ok(model.cloned().unwrap_or_else(|| "Mock".to_string()))
    }

    async fn reboot_to_bootloader(&self) -> Result<()> {
        self.require(TransportMode::Adb, "reboot bootloader")?;
        self.record("reboot bootloader".to_string());
        if self.state.lock().refuse_reboot {
            return Err(self.command_failed("reboot bootloader", "device busy"));
        }
        Ok(())
    }

    async fn reboot_to_normal(&self) -> Result<()> {
        self.record("reboot".to_string());
        Ok(())
    }
}

/// In-memory transport.
pub struct MockTransport {
    devices: Mutex<Vec<MockDevice>>,
    fastboot_scanning: AtomicBool,
    enumerations: AtomicUsize,
    events: broadcast::Sender<TransportEvent>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            devices: Mutex::new(Vec::new()),
            fastboot_scanning: AtomicBool::new(false),
            enumerations: AtomicUsize::new(0),
            events,
        }
    }

    pub fn with_device(self, device: MockDevice) -> Self {
        self.devices.lock().push(device);
        self
    }

    /// Add a device and announce it.
    pub fn attach(&self, device: MockDevice) {
        let event = TransportEvent::Attached {
            identifier: device.serial.clone(),
            mode: device.mode,
        };
        self.devices.lock().push(device);
        let _ = self.events.send(event);
    }

    /// Remove every device with `serial` and announce it.
    pub fn detach(&self, serial: &str) {
        let removed: Vec<MockDevice> = {
            let mut devices = self.devices.lock();
            let (gone, kept) = devices.drain(..).partition(|d| d.serial == serial);
            *devices = kept;
            gone
        };
        for device in removed {
            let _ = self.events.send(TransportEvent::Detached {
                identifier: device.serial,
                mode: device.mode,
            });
        }
    }

    /// Number of `enumerate` calls so far.
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn enumerate(&self) -> Result<Vec<Arc<dyn DeviceHandle>>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let scanning = self.fastboot_scanning();
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|d| d.mode == TransportMode::Adb || scanning)
            .map(|d| Arc::new(d.clone()) as Arc<dyn DeviceHandle>)
            .collect())
    }

    fn set_fastboot_scanning(&self, enabled: bool) {
        self.fastboot_scanning.store(enabled, Ordering::SeqCst);
    }

    fn fastboot_scanning(&self) -> bool {
        self.fastboot_scanning.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_property_dump_format() {
        let device = MockDevice::adb("abc").with_property("ro.product.device", "foo");
        let dump = device.shell("getprop").await.unwrap();
        assert_eq!(dump, "[ro.product.device]: [foo]\n");
    }

    #[tokio::test]
    async fn test_elevation() {
        let device = MockDevice::adb("abc");
        assert!(!device.is_elevated().await.unwrap());
        device.elevate().await.unwrap();
        assert!(device.is_elevated().await.unwrap());
    }

    #[tokio::test]
    async fn test_fastboot_hidden_until_scanning() {
        let transport = MockTransport::new()
            .with_device(MockDevice::adb("a"))
            .with_device(MockDevice::fastboot("b"));
        assert_eq!(transport.enumerate().await.unwrap().len(), 1);
        transport.set_fastboot_scanning(true);
        assert_eq!(transport.enumerate().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pull_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.bin");
        let device = MockDevice::adb("abc").with_remote_file("/lib/a.bin", b"blob");
        device.pull("/lib/a.bin", &local).await.unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"blob");
        assert_eq!(device.pulls(), vec!["/lib/a.bin".to_string()]);
    }
}
