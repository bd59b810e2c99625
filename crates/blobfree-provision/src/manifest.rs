//! Blob injection manifest (`blobs-toinject.txt`).
//!
//! One `source:target` pair per line. Both sides are device paths; a single
//! leading `/` is stripped. Lines without a non-empty source and target are
//! dropped, as are paths that would leave the staging tree. The first
//! occurrence of a source wins.

use crate::error::{ProvisionError, Result};
use crate::layout::{is_contained, strip_leading_separator};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// One source to target mapping, both relative to their trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobEntry {
    /// Path on the device and below `blobs/`
    pub source: String,
    /// Path below `content/`
    pub target: String,
}

impl BlobEntry {
    /// Device-absolute path to pull from.
    pub fn remote_path(&self) -> String {
        format!("/{}", self.source)
    }
}

/// Ordered, source-unique blob mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMapping {
    entries: Vec<BlobEntry>,
    discarded: usize,
}

impl BlobMapping {
    /// Parse manifest text.
    pub fn parse(text: &str) -> Self {
        let mut seen = HashSet::new();
        let mut mapping = BlobMapping::default();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(entry) = parse_line(line) else {
                warn!(line = number.saturating_add(1), content = line, "Ignoring malformed blob mapping");
                mapping.discarded = mapping.discarded.saturating_add(1);
                continue;
            };
            if seen.insert(entry.source.clone()) {
                mapping.entries.push(entry);
            } else {
                mapping.discarded = mapping.discarded.saturating_add(1);
            }
        }
        mapping
    }

    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProvisionError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn entries(&self) -> &[BlobEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Malformed or duplicate lines dropped while parsing.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

fn parse_line(line: &str) -> Option<BlobEntry> {
    let mut parts = line.split(':');
    let source = normalize(parts.next()?)?;
    let target = normalize(parts.next()?)?;
    Some(BlobEntry { source, target })
}

fn normalize(path: &str) -> Option<String> {
    let path = strip_leading_separator(path.trim());
    is_contained(path).then(|| path.to_string())
}
