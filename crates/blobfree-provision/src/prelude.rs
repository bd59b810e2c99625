//! Convenience re-exports for provisioning.

pub use crate::acquire::{AcquisitionReport, BlobAcquirer};
pub use crate::archive::{ArchiveCodec, ExtractPolicy, ZipCodec};
pub use crate::assembly::{AssemblyReport, HostToolchain, ImageToolchain, PartitionOutcome};
pub use crate::config::ProvisionConfig;
pub use crate::error::{AssemblyError, ProvisionError};
pub use crate::fstab::{BuildTask, BuildTasks};
pub use crate::inject::InjectionReport;
pub use crate::layout::StagingRoot;
pub use crate::manifest::BlobMapping;
pub use crate::progress::{AcquisitionEvent, ProgressUpdate};
pub use crate::session::{BuildReport, ProvisioningSession, SessionReport};
