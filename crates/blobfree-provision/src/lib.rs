//! Blob-free distribution provisioning.
//!
//! Turns a distribution archive plus a live reference device into partition
//! images:
//!
//! 1. [`extract`]: unpack the archive into a per-device staging root
//! 2. device classification, in `blobfree-device`
//! 3. [`acquire`]: pull blobs missing from `blobs/`, one at a time
//! 4. [`inject`]: copy blobs into `content/`
//! 5. [`fstab`]: derive build tasks from `recovery.fstab`
//! 6. [`assembly`]: build boot, recovery and system images concurrently
//!
//! [`session::ProvisioningSession`] chains the stages.
//!
//! # Example
//!
//! ```ignore
//! use blobfree_provision::prelude::*;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProvisionConfig::load().await?;
//! let session = ProvisioningSession::from_config(config);
//! let report = session.run(Path::new("acme_widget.42.zip"), None).await?;
//! println!("injected {:?}", report.build.injection.injected);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod acquire;
pub mod archive;
pub mod assembly;
pub mod config;
pub mod error;
pub mod extract;
pub mod fstab;
pub mod inject;
pub mod layout;
pub mod manifest;
pub mod prelude;
pub mod progress;
pub mod session;

pub use acquire::{AcquisitionReport, BlobAcquirer, FetchPlan, Unplaceable, plan_fetch};
pub use archive::{ArchiveCodec, ExtractPolicy, ExtractSummary, ZipCodec};
pub use assembly::{AssemblyReport, HostToolchain, ImageAssembler, ImageToolchain, PartitionOutcome};
pub use config::ProvisionConfig;
pub use error::{AssemblyError, ProvisionError, Result};
pub use extract::{DistributionExtractor, ExtractedDistribution};
pub use fstab::{BuildTask, BuildTasks, FstabEntry};
pub use inject::InjectionReport;
pub use layout::StagingRoot;
pub use manifest::{BlobEntry, BlobMapping};
pub use progress::{AcquisitionEvent, ProgressUpdate};
pub use session::{BuildReport, ProvisioningSession, SessionReport};
