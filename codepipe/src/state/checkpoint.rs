//! Checkpoint snapshots.

use crate::utils::parse_timestamp;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A deep copy of the progress fields of a pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    /// Stage the pipeline was on.
    pub current_stage: String,
    /// Completed stages at checkpoint time.
    pub stages_completed: Vec<String>,
    /// Artifacts at checkpoint time.
    pub artifacts: HashMap<String, serde_json::Value>,
    /// When the checkpoint was taken (RFC 3339).
    pub timestamp: String,
    /// Per-state creation order.
    #[serde(default)]
    pub seq: u64,
}

impl CheckpointSnapshot {
    /// Parses the stored timestamp. `None` if it is malformed.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<Timestamp> {
        parse_timestamp(&self.timestamp).ok()
    }
}

/// Listing entry for a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    /// Checkpoint id.
    pub id: String,
    /// Stage the checkpoint restores.
    pub stage: String,
    /// Raw timestamp.
    pub timestamp: String,
}
