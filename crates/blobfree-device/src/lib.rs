//! Device handling for blob-free provisioning.
//!
//! This crate finds attached devices, decides whether they are supported and
//! drives them through root elevation and mode switches:
//!
//! - [`catalog`]: supported-device descriptors loaded from `devices.json`
//! - [`properties`]: property dump parsing
//! - [`transport`]: the [`DeviceHandle`]/[`DeviceTransport`] seam
//! - [`handle`]: [`DiscoveredDevice`], a handle with timeouts and invalidation
//! - [`classifier`]: matching devices against the catalog
//! - [`lifecycle`]: the per-device state machine
//! - [`registry`]: enumeration, elevation and the ready list
//! - [`host`]: transport backed by the host `adb` and `fastboot` binaries
//!
//! # Example
//!
//! ```ignore
//! use blobfree_device::prelude::*;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Arc::new(DeviceCatalog::load(Path::new("devices.json")).await?);
//! let transport = Arc::new(HostTransport::new(HostTools::default()));
//! let registry = DeviceRegistry::new(transport, catalog, RegistryOptions::default());
//!
//! for device in registry.refresh().await? {
//!     println!("{} ({})", device.label, device.mode);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod catalog;
pub mod classifier;
pub mod error;
pub mod handle;
pub mod host;
pub mod lifecycle;
pub mod prelude;
pub mod properties;
pub mod registry;
pub mod transport;

pub use catalog::{Criterion, DeviceCatalog, DeviceDescriptor};
pub use classifier::Classifier;
pub use error::DeviceError;
pub use handle::{CallTimeouts, DiscoveredDevice};
pub use host::{HostTools, HostTransport};
pub use lifecycle::{Effect, LifecycleEvent, LifecycleState, Transition};
pub use properties::{PropertyMap, parse_properties};
pub use registry::{DeviceListEvent, DeviceRegistry, ReadyDevice, RegistryOptions};
pub use transport::{DeviceHandle, DeviceTransport, TransportEvent, TransportMode};
