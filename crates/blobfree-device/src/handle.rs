//! Guarded device handle.
//!
//! [`DiscoveredDevice`] wraps a raw [`DeviceHandle`] with per-call timeouts
//! and a shared invalidation token. Clones share the token, so a reboot
//! issued through one clone fails every in-flight and later call made
//! through the others with [`DeviceError::Invalidated`].

use crate::error::{DeviceError, Result};
use crate::transport::{DeviceHandle, TransportMode};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timeouts applied to device calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    /// Property, variable and shell queries
    pub query: Duration,
    /// Single file transfers
    pub pull: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(30),
            pull: Duration::from_secs(300),
        }
    }
}

/// A device handle returned by enumeration, safe to share across stages.
#[derive(Clone)]
pub struct DiscoveredDevice {
    handle: Arc<dyn DeviceHandle>,
    identifier: String,
    mode: TransportMode,
    timeouts: CallTimeouts,
    invalidated: CancellationToken,
}

impl fmt::Debug for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredDevice")
            .field("identifier", &self.identifier)
            .field("mode", &self.mode)
            .field("invalidated", &self.invalidated.is_cancelled())
            .finish()
    }
}

impl DiscoveredDevice {
    /// Wrap a raw transport handle.
    pub fn new(handle: Arc<dyn DeviceHandle>, timeouts: CallTimeouts) -> Self {
        let identifier = handle.identifier().to_string();
        let mode = handle.mode();
        Self {
            handle,
            identifier,
            mode,
            timeouts,
            invalidated: CancellationToken::new(),
        }
    }

    /// Transport identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Mode the device was enumerated in.
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Whether a mode transition has invalidated this handle.
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.is_cancelled()
    }

    /// Invalidate this handle and every clone of it.
    pub fn invalidate(&self) {
        if !self.invalidated.is_cancelled() {
            debug!(device = %self.identifier, "Invalidating device handle");
        }
        self.invalidated.cancel();
    }

    fn require_mode(&self, expected: TransportMode, operation: &str) -> Result<()> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(DeviceError::wrong_mode(&self.identifier, operation, self.mode))
        }
    }

    async fn guarded<T, F>(&self, operation: &str, limit: Duration, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.invalidated.is_cancelled() {
            return Err(DeviceError::Invalidated(self.identifier.clone()));
        }
        tokio::select! {
            biased;
            () = self.invalidated.cancelled() => {
                Err(DeviceError::Invalidated(self.identifier.clone()))
            }
            outcome = tokio::time::timeout(limit, call) => match outcome {
                Ok(result) => result,
                Err(_elapsed) => {
                    warn!(device = %self.identifier, operation, ?limit, "Device call timed out");
                    Err(DeviceError::Timeout {
                        device: self.identifier.clone(),
                        operation: operation.to_string(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            },
        }
    }

    /// Whether the device shell runs as root.
    ///
    /// # Errors
    ///
    /// Fails outside ADB mode, on timeout, or after invalidation.
    pub async fn is_elevated(&self) -> Result<bool> {
        self.require_mode(TransportMode::Adb, "is_elevated")?;
        self.guarded("is_elevated", self.timeouts.query, self.handle.is_elevated())
            .await
    }

    /// Ask the device to restart its bridge daemon as root.
    ///
    /// # Errors
    ///
    /// Fails outside ADB mode, on timeout, or after invalidation.
    pub async fn elevate(&self) -> Result<()> {
        self.require_mode(TransportMode::Adb, "elevate")?;
        self.guarded("elevate", self.timeouts.query, self.handle.elevate())
            .await
    }

    /// Run a device shell command.
    ///
    /// # Errors
    ///
    /// Fails outside ADB mode, on timeout, or after invalidation.
    pub async fn shell(&self, command: &str) -> Result<String> {
        self.require_mode(TransportMode::Adb, "shell")?;
        self.guarded("shell", self.timeouts.query, self.handle.shell(command))
            .await
    }

    /// Query one bootloader variable.
    ///
    /// # Errors
    ///
    /// Fails outside bootloader mode, on timeout, or after invalidation.
    pub async fn get_variable(&self, name: &str) -> Result<String> {
        self.require_mode(TransportMode::Fastboot, "getvar")?;
        self.guarded("getvar", self.timeouts.query, self.handle.get_variable(name))
            .await
    }

    /// Copy a device file to the host.
    ///
    /// # Errors
    ///
    /// Fails outside ADB mode, on timeout, or after invalidation.
    pub async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        self.require_mode(TransportMode::Adb, "pull")?;
        self.guarded("pull", self.timeouts.pull, self.handle.pull(remote, local))
            .await
    }

    /// Human-readable model name.
    ///
    /// # Errors
    ///
    /// Fails on timeout or after invalidation.
    pub async fn model(&self) -> Result<String> {
        self.guarded("model", self.timeouts.query, self.handle.model())
            .await
    }

    /// Reboot into the bootloader. Invalidates this handle first.
    ///
    /// # Errors
    ///
    /// Fails outside ADB mode, if already invalidated, or if the reboot
    /// command fails.
    pub async fn reboot_to_bootloader(&self) -> Result<()> {
        self.require_mode(TransportMode::Adb, "reboot bootloader")?;
        self.transition("reboot bootloader", self.handle.reboot_to_bootloader())
            .await
    }

    /// Reboot into the normal OS. Invalidates this handle first.
    ///
    /// # Errors
    ///
    /// Fails if already invalidated or if the reboot command fails.
    pub async fn reboot_to_normal(&self) -> Result<()> {
        self.transition("reboot", self.handle.reboot_to_normal()).await
    }

    async fn transition<F>(&self, operation: &str, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        if self.invalidated.is_cancelled() {
            return Err(DeviceError::Invalidated(self.identifier.clone()));
        }
        self.invalidate();
        match tokio::time::timeout(self.timeouts.query, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(DeviceError::Timeout {
                device: self.identifier.clone(),
                operation: operation.to_string(),
                timeout_ms: u64::try_from(self.timeouts.query.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
