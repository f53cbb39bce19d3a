//! Error types for the codepipe engine.
//!
//! Every fallible engine operation returns [`PipelineResult`]. Callers branch
//! on the variant (or the `is_*` helpers) instead of inspecting messages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The kind of entity a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A unit of work.
    Task,
    /// A persisted pipeline state.
    PipelineState,
    /// A checkpoint inside a pipeline state.
    Checkpoint,
    /// A feedback item inside a pipeline state.
    Feedback,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::PipelineState => write!(f, "pipeline state"),
            Self::Checkpoint => write!(f, "checkpoint"),
            Self::Feedback => write!(f, "feedback"),
        }
    }
}

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A referenced entity does not exist.
    #[error("{kind} with ID {id} not found")]
    NotFound {
        /// What was looked up.
        kind: EntityKind,
        /// The identifier that did not resolve.
        id: String,
    },

    /// A stage predecessor check or adjacency check failed.
    #[error("Invalid pipeline transition from {} to {to}", .from.as_deref().unwrap_or("initial state"))]
    InvalidTransition {
        /// The stage the pipeline is moving from, `None` for the initial state.
        from: Option<String>,
        /// The stage the pipeline attempted to move to.
        to: String,
    },

    /// A stage name is not a member of the stage sequence.
    #[error("Invalid stage name: {name}")]
    InvalidStage {
        /// The unrecognised stage name.
        name: String,
    },

    /// A stage's own execution returned an error.
    #[error("Stage {stage} failed: {message}")]
    StageExecution {
        /// The failing stage.
        stage: String,
        /// The error reported by the stage.
        message: String,
    },

    /// An entity failed construction-time validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A save raced with another writer.
    #[error("Version conflict on pipeline state {id}: expected version {expected}, found {found}")]
    VersionConflict {
        /// The pipeline state id.
        id: String,
        /// The version the writer loaded.
        expected: u64,
        /// The version currently stored.
        found: u64,
    },

    /// A transaction handle was unknown or already finished.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The persistence backend failed.
    #[error("Repository error: {0}")]
    Repository(String),

    /// The human feedback prompt could not be completed.
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Creates an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: Option<&str>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.map(String::from),
            to: to.into(),
        }
    }

    /// Creates an invalid stage error.
    #[must_use]
    pub fn invalid_stage(name: impl Into<String>) -> Self {
        Self::InvalidStage { name: name.into() }
    }

    /// Creates a stage execution error.
    #[must_use]
    pub fn stage_execution(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageExecution {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns true for any not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this error reports a missing entity of `kind`.
    #[must_use]
    pub fn is_not_found_kind(&self, kind: EntityKind) -> bool {
        matches!(self, Self::NotFound { kind: k, .. } if *k == kind)
    }

    /// Returns true for transition errors.
    #[must_use]
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Returns true for unknown stage names.
    #[must_use]
    pub fn is_invalid_stage(&self) -> bool {
        matches!(self, Self::InvalidStage { .. })
    }

    /// A short, stable identifier for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::InvalidStage { .. } => "InvalidStage",
            Self::StageExecution { .. } => "StageExecutionFailure",
            Self::Validation(_) => "Validation",
            Self::VersionConflict { .. } => "VersionConflict",
            Self::Transaction(_) => "Transaction",
            Self::Repository(_) => "Repository",
            Self::Prompt(_) => "Prompt",
            Self::Serialization(_) => "Serialization",
            Self::Io(_) => "Io",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.code()));

        match self {
            Self::NotFound { kind, id } => {
                map.insert("kind".to_string(), serde_json::json!(kind));
                map.insert("id".to_string(), serde_json::json!(id));
            }
            Self::InvalidTransition { from, to } => {
                map.insert("from".to_string(), serde_json::json!(from));
                map.insert("to".to_string(), serde_json::json!(to));
            }
            Self::InvalidStage { name } => {
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::StageExecution { stage, .. } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
            }
            Self::VersionConflict { id, expected, found } => {
                map.insert("id".to_string(), serde_json::json!(id));
                map.insert("expected".to_string(), serde_json::json!(expected));
                map.insert("found".to_string(), serde_json::json!(found));
            }
            _ => {}
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}
