//! Stage result types.

use crate::core::StageStatus;
use crate::errors::PipelineError;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Typed result returned by a stage. Ephemeral: only its output is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Name of the stage that produced this result.
    pub stage_id: String,
    /// Stage status.
    pub status: StageStatus,
    /// Output payload.
    #[serde(default)]
    pub output: HashMap<String, serde_json::Value>,
    /// Error message if the stage did not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the result was produced.
    pub timestamp: Timestamp,
}

impl StageResult {
    /// Creates a new stage result with an empty output.
    #[must_use]
    pub fn new(stage_id: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage_id: stage_id.into(),
            status,
            output: HashMap::new(),
            error: None,
            timestamp: now_utc(),
        }
    }

    /// Creates a completed stage result.
    #[must_use]
    pub fn completed(
        stage_id: impl Into<String>,
        output: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            output,
            ..Self::new(stage_id, StageStatus::Completed)
        }
    }

    /// Creates a failed stage result.
    #[must_use]
    pub fn failed(stage_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(stage_id, StageStatus::Failed)
        }
    }

    /// Creates a skipped stage result.
    #[must_use]
    pub fn skipped(stage_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(stage_id, StageStatus::Skipped)
        }
    }

    /// Adds a single output value.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }

    /// Returns true if the stage completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_completed()
    }

    /// The payload stored in the state's artifacts for this result.
    ///
    /// A non-completed result carries its error under `"error"`.
    #[must_use]
    pub fn artifact_payload(&self) -> serde_json::Value {
        let mut payload: serde_json::Map<String, serde_json::Value> = self
            .output
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if !self.is_success() {
            if let Some(ref error) = self.error {
                payload.insert("error".to_string(), serde_json::json!(error));
            }
        }

        serde_json::Value::Object(payload)
    }
}

/// Error raised when a stage cannot produce a result at all.
#[derive(Debug, Clone, Error)]
#[error("Stage {stage} failed: {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: String,
    /// Original error message.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl From<StageError> for PipelineError {
    fn from(err: StageError) -> Self {
        PipelineError::stage_execution(err.stage, err.message)
    }
}
