//! Human feedback attached to a pipeline stage.

use crate::core::FeedbackType;
use crate::utils::{generate_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// One piece of feedback on one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Unique id.
    pub id: String,
    /// Stage the feedback refers to.
    pub stage_name: String,
    /// Free-text content.
    pub content: String,
    /// Kind of feedback; drives prioritisation.
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    /// Submission time.
    pub timestamp: Timestamp,
    /// Whether the feedback has been incorporated.
    #[serde(default)]
    pub incorporated: bool,
}

impl FeedbackItem {
    /// Creates a new, not yet incorporated item with a fresh id.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        content: impl Into<String>,
        feedback_type: FeedbackType,
    ) -> Self {
        Self {
            id: generate_id(),
            stage_name: stage_name.into(),
            content: content.into(),
            feedback_type,
            timestamp: now_utc(),
            incorporated: false,
        }
    }
}
