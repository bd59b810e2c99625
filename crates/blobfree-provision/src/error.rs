//! Error types for provisioning operations

use blobfree_device::DeviceError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a provisioning session
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Archive file name has no product/device token before its first '.'
    #[error("Archive name has no product token: {0}")]
    InvalidArchiveName(PathBuf),

    /// A path that must be a directory exists as something else
    #[error("Path exists but is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Distribution is missing one of the required root files
    #[error("Distribution is missing required file: {0}")]
    MissingManifest(String),

    /// Archive could not be read or unpacked
    #[error("Archive error in {path}: {message}")]
    Archive {
        /// Archive path
        path: PathBuf,
        /// Codec message
        message: String,
    },

    /// Device catalog could not be parsed, or a device call failed fatally
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// No supported device is ready in ADB mode
    #[error("No supported device is ready in ADB mode")]
    NoReadyDevice,

    /// Device shell does not run as root
    #[error("Device {0} is not elevated; blob acquisition needs root access")]
    NotElevated(String),

    /// Device is not attached over the debug bridge
    #[error("Device {0} is not in ADB mode")]
    NotAdb(String),

    /// I/O error on a staging path
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the distribution itself is unusable.
    pub fn is_invalid_distribution(&self) -> bool {
        matches!(
            self,
            ProvisionError::InvalidArchiveName(_)
                | ProvisionError::MissingManifest(_)
                | ProvisionError::Archive { .. }
                | ProvisionError::NotADirectory(_)
                | ProvisionError::Device(DeviceError::InvalidCatalog(_))
        )
    }
}

/// Errors that fail a single partition build
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Source directory has no RAMDISK subdirectory
    #[error("RAMDISK directory missing: {0}")]
    MissingRamdisk(PathBuf),

    /// A boot image fragment could not be read
    #[error("Boot image fragment unreadable: {path}: {message}")]
    MissingFragment {
        /// Fragment path
        path: PathBuf,
        /// Read error
        message: String,
    },

    /// `pagesize` is not a positive integer
    #[error("Invalid page size: '{0}'")]
    InvalidPageSize(String),

    /// Kernel image missing from the source directory
    #[error("Kernel image missing: {0}")]
    MissingKernel(PathBuf),

    /// External tool failed
    #[error("{tool} failed: {message}")]
    ToolFailed {
        /// Tool name
        tool: String,
        /// Failure detail
        message: String,
    },

    /// External tool reported success but produced nothing
    #[error("{tool} did not produce {path}")]
    OutputMissing {
        /// Tool name
        tool: String,
        /// Expected output
        path: PathBuf,
    },

    /// I/O error while staging build inputs or outputs
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Error message
        message: String,
    },
}

impl AssemblyError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        AssemblyError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for session-level operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_distribution_classification() {
        assert!(ProvisionError::MissingManifest("devices.json".into()).is_invalid_distribution());
        assert!(
            ProvisionError::Device(DeviceError::InvalidCatalog("bad".into())).is_invalid_distribution()
        );
        assert!(!ProvisionError::NoReadyDevice.is_invalid_distribution());
        assert!(!ProvisionError::NotElevated("abc".into()).is_invalid_distribution());
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = ProvisionError::io("/tmp/x", std::io::Error::other("denied"));
        assert!(err.to_string().contains("/tmp/x"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
