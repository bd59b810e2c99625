//! Device classification against the catalog.
//!
//! ADB devices are matched on one full property dump. Bootloader devices
//! are matched descriptor by descriptor: every variable a descriptor needs
//! is queried concurrently, and the first descriptor in catalog order whose
//! criteria all hold wins.

use crate::catalog::{DeviceCatalog, DeviceDescriptor};
use crate::error::{DeviceError, Result};
use crate::handle::DiscoveredDevice;
use crate::properties::parse_properties;
use crate::transport::TransportMode;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shell command producing the property dump.
pub const PROPERTY_DUMP_COMMAND: &str = "getprop";

/// Matches discovered devices against a catalog.
#[derive(Debug, Clone)]
pub struct Classifier {
    catalog: Arc<DeviceCatalog>,
}

impl Classifier {
    /// Create a classifier over a catalog.
    pub fn new(catalog: Arc<DeviceCatalog>) -> Self {
        Self { catalog }
    }

    /// The catalog in use.
    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Find the descriptor a device matches.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unsupported`] when nothing matches, or the
    /// underlying error if the property dump cannot be read or the handle
    /// is invalidated mid-classification.
    pub async fn classify(&self, device: &DiscoveredDevice) -> Result<DeviceDescriptor> {
        let matched = match device.mode() {
            TransportMode::Adb => self.classify_adb(device).await?,
            TransportMode::Fastboot => self.classify_fastboot(device).await?,
        };
        match matched {
            Some(descriptor) => {
                info!(
                    device = %device.identifier(),
                    mode = %device.mode(),
                    descriptor = %descriptor.label(),
                    "Device classified"
                );
                Ok(descriptor)
            }
            None => {
                debug!(device = %device.identifier(), mode = %device.mode(), "No descriptor matched");
                Err(DeviceError::Unsupported(device.identifier().to_string()))
            }
        }
    }

    async fn classify_adb(&self, device: &DiscoveredDevice) -> Result<Option<DeviceDescriptor>> {
        let dump = device.shell(PROPERTY_DUMP_COMMAND).await?;
        let properties = parse_properties(&dump);
        debug!(device = %device.identifier(), properties = properties.len(), "Read property dump");
        Ok(self.catalog.match_adb(&properties).cloned())
    }

    async fn classify_fastboot(&self, device: &DiscoveredDevice) -> Result<Option<DeviceDescriptor>> {
        for descriptor in self.catalog.descriptors() {
            let variables = query_variables(device, descriptor).await?;
            if descriptor.matches_fastboot(&variables) {
                return Ok(Some(descriptor.clone()));
            }
        }
        Ok(None)
    }
}

/// Query every variable a descriptor needs, concurrently.
///
/// Variables that fail to answer are left out of the result, which makes the
/// descriptor fail to match. Losing the handle aborts classification.
async fn query_variables(
    device: &DiscoveredDevice,
    descriptor: &DeviceDescriptor,
) -> Result<HashMap<String, String>> {
    let queries = descriptor.fastboot.keys().map(|name| async move {
        (name.clone(), device.get_variable(name).await)
    });

    let mut variables = HashMap::new();
    for (name, outcome) in join_all(queries).await {
        match outcome {
            Ok(value) => {
                variables.insert(name, value.trim().to_string());
            }
            Err(e) if e.is_handle_lost() => return Err(e),
            Err(e) => {
                warn!(device = %device.identifier(), variable = %name, error = %e, "Variable query failed");
            }
        }
    }
    Ok(variables)
}
