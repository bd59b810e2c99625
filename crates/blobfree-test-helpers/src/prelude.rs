//! Convenience re-exports for common test utilities.

pub use crate::must::{must, must_err, must_some};

#[cfg(feature = "mock")]
pub use crate::mock::{MockDevice, MockTransport};

#[cfg(feature = "fixtures")]
pub use crate::fixtures::{DistributionFixture, SAMPLE_CATALOG, SAMPLE_FSTAB, SAMPLE_MANIFEST, zip_bytes};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
