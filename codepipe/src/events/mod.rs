//! Pipeline lifecycle events.
//!
//! Components emit [`PipelineEvent`]s to an injected [`EventSink`]. There is
//! no process-wide sink; whoever wires the engine together chooses one.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A stage is about to execute.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage completed and the pipeline advanced.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage returned a non-completed result; the pipeline did not advance.
    #[serde(rename = "stage.parked")]
    StageParked,
    /// A checkpoint was stored.
    #[serde(rename = "checkpoint.created")]
    CheckpointCreated,
    /// Progress was restored from a checkpoint.
    #[serde(rename = "pipeline.rollback")]
    PipelineRollback,
    /// A run stopped before the terminal stage.
    #[serde(rename = "pipeline.stalled")]
    PipelineStalled,
    /// A run finished the terminal stage.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
    /// Feedback was attached to a stage.
    #[serde(rename = "feedback.submitted")]
    FeedbackSubmitted,
    /// Feedback was marked incorporated.
    #[serde(rename = "feedback.incorporated")]
    FeedbackIncorporated,
}

impl EventKind {
    /// Dotted event name, e.g. `stage.started`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageParked => "stage.parked",
            Self::CheckpointCreated => "checkpoint.created",
            Self::PipelineRollback => "pipeline.rollback",
            Self::PipelineStalled => "pipeline.stalled",
            Self::PipelineCompleted => "pipeline.completed",
            Self::FeedbackSubmitted => "feedback.submitted",
            Self::FeedbackIncorporated => "feedback.incorporated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event for one pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The pipeline state the event concerns.
    pub state_id: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// When the event was raised.
    pub timestamp: Timestamp,
}

impl PipelineEvent {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(kind: EventKind, state_id: impl Into<String>) -> Self {
        Self {
            kind,
            state_id: state_id.into(),
            data: serde_json::Value::Null,
            timestamp: now_utc(),
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
