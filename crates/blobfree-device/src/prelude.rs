//! Convenience re-exports for common device types

pub use crate::catalog::{Criterion, DeviceCatalog, DeviceDescriptor};
pub use crate::classifier::Classifier;
pub use crate::error::DeviceError;
pub use crate::handle::{CallTimeouts, DiscoveredDevice};
pub use crate::host::{HostTools, HostTransport};
pub use crate::lifecycle::{Effect, LifecycleEvent, LifecycleState, Transition};
pub use crate::properties::{PropertyMap, parse_properties};
pub use crate::registry::{DeviceListEvent, DeviceRegistry, ReadyDevice, RegistryOptions};
pub use crate::transport::{DeviceHandle, DeviceTransport, TransportEvent, TransportMode};
