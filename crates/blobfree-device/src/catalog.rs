//! Supported-device catalog.
//!
//! A catalog is an ordered list of [`DeviceDescriptor`]s loaded from the
//! distribution's `devices.json`. Each descriptor lists the ADB properties
//! and bootloader variables a device must report to be considered that
//! device. Criteria are either one exact value or a set of accepted values:
//!
//! ```json
//! [
//!   {
//!     "id": "acme-widget",
//!     "adb": { "ro.product.device": ["widget", "widget_lte"] },
//!     "fastboot": { "product": "widget" }
//!   }
//! ]
//! ```

use crate::error::{DeviceError, Result};
use crate::properties::PropertyMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Match criterion for one property or variable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Criterion {
    /// Value must equal this string
    Exact(String),
    /// Value must be one of these strings
    OneOf(Vec<String>),
}

impl Criterion {
    /// Whether `value` satisfies this criterion. An absent value never does.
    pub fn accepts(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Criterion::Exact(expected) => expected == value,
            Criterion::OneOf(accepted) => accepted.iter().any(|candidate| candidate == value),
        }
    }
}

impl TryFrom<Value> for Criterion {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(scalar_to_string)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Criterion::OneOf),
            other => scalar_to_string(other).map(Criterion::Exact),
        }
    }
}

fn scalar_to_string(value: Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("unsupported criterion value: {other}")),
    }
}

impl Serialize for Criterion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Criterion::Exact(value) => serializer.serialize_str(value),
            Criterion::OneOf(values) => serializer.collect_seq(values),
        }
    }
}

/// One supported device model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Optional catalog identifier
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Required ADB properties
    #[serde(default)]
    pub adb: BTreeMap<String, Criterion>,
    /// Required bootloader variables
    #[serde(default)]
    pub fastboot: BTreeMap<String, Criterion>,
}

impl DeviceDescriptor {
    /// Whether the given property map satisfies every ADB criterion.
    ///
    /// A descriptor without ADB criteria matches any ADB device.
    pub fn matches_adb(&self, properties: &PropertyMap) -> bool {
        criteria_match(&self.adb, properties)
    }

    /// Whether the given variable values satisfy every bootloader criterion.
    ///
    /// A descriptor without bootloader criteria matches any bootloader device.
    pub fn matches_fastboot(&self, variables: &HashMap<String, String>) -> bool {
        criteria_match(&self.fastboot, variables)
    }

    /// Label used in logs and reports.
    pub fn label(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        let exact = |map: &BTreeMap<String, Criterion>, key: &str| match map.get(key) {
            Some(Criterion::Exact(value)) => Some(value.clone()),
            Some(Criterion::OneOf(values)) => values.first().cloned(),
            None => None,
        };
        exact(&self.adb, "ro.product.device")
            .or_else(|| exact(&self.fastboot, "product"))
            .unwrap_or_else(|| "unnamed descriptor".to_string())
    }
}

fn criteria_match(criteria: &BTreeMap<String, Criterion>, values: &HashMap<String, String>) -> bool {
    criteria
        .iter()
        .all(|(name, criterion)| criterion.accepts(values.get(name).map(String::as_str)))
}

/// Ordered list of supported devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceCatalog {
    descriptors: Vec<DeviceDescriptor>,
}

impl DeviceCatalog {
    /// Build a catalog from descriptors in priority order.
    pub fn new(descriptors: Vec<DeviceDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Parse a catalog from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidCatalog`] if the text is not a JSON
    /// array of descriptors.
    pub fn from_json(text: &str) -> Result<Self> {
        let catalog: DeviceCatalog = serde_json::from_str(text)?;
        debug!(descriptors = catalog.len(), "Parsed device catalog");
        Ok(catalog)
    }

    /// Load a catalog from a file.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidCatalog`] if the file cannot be read
    /// or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DeviceError::InvalidCatalog(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Descriptors in priority order.
    pub fn descriptors(&self) -> &[DeviceDescriptor] {
        &self.descriptors
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the catalog lists no devices.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// First descriptor whose ADB criteria the properties satisfy.
    pub fn match_adb(&self, properties: &PropertyMap) -> Option<&DeviceDescriptor> {
        self.descriptors.iter().find(|d| d.matches_adb(properties))
    }

    /// First descriptor whose bootloader criteria the variables satisfy.
    pub fn match_fastboot(&self, variables: &HashMap<String, String>) -> Option<&DeviceDescriptor> {
        self.descriptors.iter().find(|d| d.matches_fastboot(variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_criterion_exact_and_set() {
        let exact = Criterion::Exact("foo".into());
        assert!(exact.accepts(Some("foo")));
        assert!(!exact.accepts(Some("bar")));
        assert!(!exact.accepts(None));

        let set = Criterion::OneOf(vec!["a".into(), "b".into()]);
        assert!(set.accepts(Some("b")));
        assert!(!set.accepts(Some("c")));
    }

    #[test]
    fn test_catalog_parses_scalars_and_lists() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let catalog = DeviceCatalog::from_json(
            r#"[{"id":"d","adb":{"ro.product.device":["foo","bar"],"ro.sdk":19},"fastboot":{"product":"foo"}}]"#,
        )?;
        let descriptor = catalog.descriptors().first().ok_or("missing descriptor")?;
        assert_eq!(descriptor.adb.get("ro.sdk"), Some(&Criterion::Exact("19".into())));
        assert_eq!(
            descriptor.adb.get("ro.product.device"),
            Some(&Criterion::OneOf(vec!["foo".into(), "bar".into()]))
        );
        Ok(())
    }

    #[test]
    fn test_catalog_rejects_nested_objects() {
        let result = DeviceCatalog::from_json(r#"[{"adb":{"ro.product.device":{"x":1}}}]"#);
        assert!(matches!(result, Err(DeviceError::InvalidCatalog(_))));
    }

    #[test]
    fn test_first_match_wins() {
        let catalog = DeviceCatalog::new(vec![
            DeviceDescriptor {
                id: Some("first".into()),
                adb: BTreeMap::from([("ro.product.device".into(), Criterion::Exact("foo".into()))]),
                fastboot: BTreeMap::new(),
            },
            DeviceDescriptor {
                id: Some("second".into()),
                adb: BTreeMap::from([(
                    "ro.product.device".into(),
                    Criterion::OneOf(vec!["foo".into(), "bar".into()]),
                )]),
                fastboot: BTreeMap::new(),
            },
        ]);
        let matched = catalog.match_adb(&props(&[("ro.product.device", "foo")]));
        assert_eq!(matched.and_then(|d| d.id.as_deref()), Some("first"));
        let matched = catalog.match_adb(&props(&[("ro.product.device", "bar")]));
        assert_eq!(matched.and_then(|d| d.id.as_deref()), Some("second"));
        assert!(catalog.match_adb(&props(&[("ro.product.device", "baz")])).is_none());
    }

    #[test]
    fn test_empty_criteria_match_anything() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let catalog = DeviceCatalog::from_json(r#"[{"id":"any","adb":{},"fastboot":{"product":"x"}}]"#)?;
        let matched = catalog.match_adb(&props(&[("ro.product.device", "z")]));
        assert_eq!(matched.and_then(|d| d.id.as_deref()), Some("any"));

        let descriptor = DeviceDescriptor {
            id: None,
            adb: BTreeMap::from([("ro.product.device".into(), Criterion::Exact("foo".into()))]),
            fastboot: BTreeMap::new(),
        };
        assert!(descriptor.matches_fastboot(&HashMap::new()));
        assert!(!descriptor.matches_adb(&props(&[])));
        assert_eq!(descriptor.label(), "foo");
        Ok(())
    }
}
