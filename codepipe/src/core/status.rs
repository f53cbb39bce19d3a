//! Stage, task and feedback status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is waiting to run.
    Pending,
    /// Stage is currently running.
    InProgress,
    /// Stage completed successfully.
    Completed,
    /// Stage failed.
    Failed,
    /// Stage was skipped.
    Skipped,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true only for `Completed`, the one status that advances a pipeline.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// The kind of human feedback, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// A critical issue that must be fixed.
    Correction,
    /// An improvement.
    Suggestion,
    /// A nice-to-have addition.
    Enhancement,
}

impl Default for FeedbackType {
    fn default() -> Self {
        Self::Suggestion
    }
}

impl FeedbackType {
    /// Priority rank; lower runs first.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Self::Correction => 1,
            Self::Suggestion => 2,
            Self::Enhancement => 3,
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Correction => write!(f, "correction"),
            Self::Suggestion => write!(f, "suggestion"),
            Self::Enhancement => write!(f, "enhancement"),
        }
    }
}

impl FromStr for FeedbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "correction" => Ok(Self::Correction),
            "suggestion" => Ok(Self::Suggestion),
            "enhancement" => Ok(Self::Enhancement),
            other => Err(format!("unknown feedback type: {other}")),
        }
    }
}

/// The lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    Pending,
    /// Being processed by a pipeline.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully; may be retried.
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// Statuses reachable from this one.
    #[must_use]
    pub fn allowed_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::InProgress],
            Self::InProgress => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[Self::InProgress],
        }
    }

    /// Returns true if `next` is reachable from this status.
    #[must_use]
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
