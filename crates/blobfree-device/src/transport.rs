//! Transport abstraction over the host's debug-bridge and bootloader tools.
//!
//! A [`DeviceTransport`] enumerates attached devices and hands out
//! [`DeviceHandle`]s. Handles are raw: they carry no timeout or invalidation
//! logic. Wrap them in [`crate::DiscoveredDevice`] before use.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Mode a device is attached in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Debug bridge, normal OS running
    Adb,
    /// Bootloader flashing protocol
    Fastboot,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Adb => write!(f, "adb"),
            TransportMode::Fastboot => write!(f, "fastboot"),
        }
    }
}

/// One attached device as seen by the transport.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Transport identifier (serial number).
    fn identifier(&self) -> &str;

    /// Mode the device was enumerated in.
    fn mode(&self) -> TransportMode;

    /// Whether the device-side shell runs with root privileges.
    async fn is_elevated(&self) -> Result<bool>;

    /// Ask the device to restart its bridge daemon with root privileges.
    async fn elevate(&self) -> Result<()>;

    /// Run a shell command and return its stdout.
    async fn shell(&self, command: &str) -> Result<String>;

    /// Query one bootloader variable.
    async fn get_variable(&self, name: &str) -> Result<String>;

    /// Copy a file from the device to a host path.
    async fn pull(&self, remote: &str, local: &Path) -> Result<()>;

    /// Human-readable model name.
    async fn model(&self) -> Result<String>;

    /// Reboot from the running OS into the bootloader.
    async fn reboot_to_bootloader(&self) -> Result<()>;

    /// Reboot into the normal OS.
    async fn reboot_to_normal(&self) -> Result<()>;
}

/// Attach and detach notifications from a transport watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A device appeared
    Attached {
        /// Device identifier
        identifier: String,
        /// Mode it appeared in
        mode: TransportMode,
    },
    /// A device disappeared
    Detached {
        /// Device identifier
        identifier: String,
        /// Mode it disappeared from
        mode: TransportMode,
    },
}

/// Enumerates devices across both modes.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// List every device currently attached. Bootloader-mode devices are
    /// only included while fastboot scanning is enabled.
    async fn enumerate(&self) -> Result<Vec<Arc<dyn DeviceHandle>>>;

    /// Enable or disable scanning for bootloader-mode devices.
    fn set_fastboot_scanning(&self, enabled: bool);

    /// Whether bootloader-mode devices are currently scanned.
    fn fastboot_scanning(&self) -> bool;

    /// Subscribe to attach/detach notifications.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
