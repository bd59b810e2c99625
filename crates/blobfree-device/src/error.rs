//! Device discovery, classification and transport error types.

use crate::lifecycle::{LifecycleEvent, LifecycleState};
use crate::transport::TransportMode;

/// Device and transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// Device not found
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The handle was invalidated by a mode transition
    #[error("Device {0} handle was invalidated by a mode transition")]
    Invalidated(String),

    /// Device timeout
    #[error("Device {device} timeout after {timeout_ms}ms during {operation}")]
    Timeout {
        /// Device identifier
        device: String,
        /// Operation that was running
        operation: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// A host tool ran but reported failure
    #[error("Command '{command}' failed for device {device}: {message}")]
    CommandFailed {
        /// Device identifier
        device: String,
        /// Command line that failed
        command: String,
        /// Captured error output
        message: String,
    },

    /// A host tool could not be started
    #[error("Failed to execute '{program}': {message}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Error message
        message: String,
    },

    /// Operation not available in the device's current mode
    #[error("Operation '{operation}' is not available in {mode} mode on device {device}")]
    WrongMode {
        /// Device identifier
        device: String,
        /// Operation name
        operation: String,
        /// Current transport mode
        mode: TransportMode,
    },

    /// No catalog descriptor matches the device
    #[error("Device {0} does not match any supported descriptor")]
    Unsupported(String),

    /// Catalog could not be read or parsed
    #[error("Invalid device catalog: {0}")]
    InvalidCatalog(String),

    /// Lifecycle transition not allowed from the current state
    #[error("Invalid lifecycle transition from {from:?} on {event:?}")]
    InvalidTransition {
        /// State the device was in
        from: LifecycleState,
        /// Rejected event
        event: LifecycleEvent,
    },

    /// Device exists but is not in a state that allows the request
    #[error("Device {device} not ready: {reason}")]
    NotReady {
        /// Device identifier
        device: String,
        /// Why the request was refused
        reason: String,
    },
}

impl DeviceError {
    /// Check if this error means the handle can no longer be used.
    pub fn is_handle_lost(&self) -> bool {
        matches!(self, DeviceError::Invalidated(_) | DeviceError::NotFound(_))
    }

    /// Create a not found error.
    pub fn not_found(device: impl Into<String>) -> Self {
        DeviceError::NotFound(device.into())
    }

    /// Create a wrong mode error.
    pub fn wrong_mode(
        device: impl Into<String>,
        operation: impl Into<String>,
        mode: TransportMode,
    ) -> Self {
        DeviceError::WrongMode {
            device: device.into(),
            operation: operation.into(),
            mode,
        }
    }

    /// Create a not ready error.
    pub fn not_ready(device: impl Into<String>, reason: impl Into<String>) -> Self {
        DeviceError::NotReady {
            device: device.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::InvalidCatalog(err.to_string())
    }
}

/// Result alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;
