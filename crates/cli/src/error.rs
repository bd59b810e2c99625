//! Error types for blobfreectl

use blobfree_device::DeviceError;
use blobfree_provision::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Partition build failed: {}", .0.join(", "))]
    PartitionFailed(Vec<String>),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::PartitionFailed(_) => 4,
            CliError::InvalidConfiguration(_) => 1,
        }
    }
}

/// Exit code for any error reaching `main`.
///
/// Library errors are recognised anywhere in the chain so commands can
/// propagate them with `?` and still get a precise code.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return cli.exit_code();
        }
        if let Some(provision) = cause.downcast_ref::<ProvisionError>() {
            if matches!(provision, ProvisionError::NoReadyDevice) {
                return 2;
            }
            if provision.is_invalid_distribution() {
                return 3;
            }
        }
        if let Some(DeviceError::NotFound(_)) = cause.downcast_ref::<DeviceError>() {
            return 2;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn codes_follow_error_kind() {
        assert_eq!(exit_code(&ProvisionError::NoReadyDevice.into()), 2);
        assert_eq!(exit_code(&ProvisionError::MissingManifest("devices.json".into()).into()), 3);
        assert_eq!(
            exit_code(&CliError::PartitionFailed(vec!["system.img".into()]).into()),
            4
        );
        assert_eq!(exit_code(&DeviceError::NotFound("X".into()).into()), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("something else")), 1);
    }

    #[test]
    fn context_does_not_hide_code() {
        let err = anyhow::Error::from(ProvisionError::NotADirectory(PathBuf::from("/tmp/x")))
            .context("Extraction failed");
        assert_eq!(exit_code(&err), 3);
    }
}
