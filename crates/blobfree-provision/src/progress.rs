//! Progress events published during blob acquisition.

use serde::Serialize;

/// Position within a batch.
///
/// Positions count from 1: the update for the first of three pulls carries
/// `index: 1, total: 3`, and it is sent before that pull starts. A consumer
/// wanting pulls-completed should use `index - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// 1-based position of the current item
    pub index: usize,
    /// Items in the batch
    pub total: usize,
    /// Item being processed
    pub label: String,
}

impl ProgressUpdate {
    /// Completed fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.index as f64 / self.total as f64
    }
}

/// Acquisition lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AcquisitionEvent {
    /// The fetch list is known
    Started {
        /// Blobs to pull
        total: usize,
    },
    /// A pull is about to be issued
    Progress(ProgressUpdate),
    /// A blob could not be pulled or placed; it stays missing
    Failed {
        /// Blob source path
        source: String,
        /// Failure text
        message: String,
    },
    /// Every queued pull has been attempted
    Completed {
        /// Blobs now cached
        fetched: usize,
        /// Blobs still missing
        failed: usize,
    },
}
