//! The persisted progress record of one pipeline run.

use super::{CheckpointSnapshot, CheckpointSummary, FeedbackItem};
use crate::core::{FeedbackType, StageSequence};
use crate::errors::{EntityKind, PipelineError, PipelineResult};
use crate::stages::StageResult;
use crate::utils::{checkpoint_stamp, format_iso8601, generate_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Progress of one task through the stage sequence.
///
/// `current_stage` is always a member of the sequence the state was built
/// against. `stages_completed` grows only through
/// [`record_stage_result`](Self::record_stage_result) and is restored
/// wholesale by rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique id.
    pub id: String,
    /// The task being processed.
    pub task_id: String,
    /// Stage the pipeline is parked on or about to run.
    pub current_stage: String,
    /// Stages that completed, in completion order.
    #[serde(default)]
    pub stages_completed: Vec<String>,
    /// Stage name to that stage's latest output.
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
    /// Feedback log, in submission order.
    #[serde(default)]
    pub feedback: Vec<FeedbackItem>,
    /// Checkpoint id to snapshot.
    #[serde(default)]
    pub checkpoint_data: HashMap<String, CheckpointSnapshot>,
    /// Last checkpoint sequence number handed out. Never decreases.
    #[serde(default)]
    pub checkpoint_seq: u64,
    /// Optimistic concurrency stamp, bumped by every save.
    #[serde(default)]
    pub version: u64,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last persisted mutation.
    pub updated_at: Timestamp,
}

impl PipelineState {
    /// Creates a fresh state positioned at the first stage of `sequence`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the sequence is empty.
    pub fn new(task_id: impl Into<String>, sequence: &StageSequence) -> PipelineResult<Self> {
        let first = sequence
            .first()
            .ok_or_else(|| PipelineError::Validation("stage sequence is empty".to_string()))?;
        Self::from_parts(
            generate_id(),
            task_id,
            first,
            Vec::new(),
            HashMap::new(),
            sequence,
        )
    }

    /// Builds a state from explicit progress fields.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `current_stage` is not in `sequence`.
    pub fn from_parts(
        id: impl Into<String>,
        task_id: impl Into<String>,
        current_stage: impl Into<String>,
        stages_completed: Vec<String>,
        artifacts: HashMap<String, serde_json::Value>,
        sequence: &StageSequence,
    ) -> PipelineResult<Self> {
        let current_stage = current_stage.into();
        if !sequence.contains(&current_stage) {
            return Err(PipelineError::Validation(format!(
                "Invalid stage: {current_stage}. Must be one of: {}",
                sequence.stages().join(", ")
            )));
        }

        let now = now_utc();
        Ok(Self {
            id: id.into(),
            task_id: task_id.into(),
            current_stage,
            stages_completed,
            artifacts,
            feedback: Vec::new(),
            checkpoint_data: HashMap::new(),
            checkpoint_seq: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// The most recently completed stage, `None` before the first one.
    #[must_use]
    pub fn previous_stage(&self) -> Option<&str> {
        self.stages_completed.last().map(String::as_str)
    }

    /// Whether every stage of `sequence` has completed.
    #[must_use]
    pub fn is_complete(&self, sequence: &StageSequence) -> bool {
        !sequence.is_empty()
            && sequence
                .stages()
                .iter()
                .all(|stage| self.stages_completed.contains(stage))
    }

    /// Checks that moving from `current_stage` to `next` stays or advances by one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` otherwise.
    pub fn validate_transition_to(&self, next: &str, sequence: &StageSequence) -> PipelineResult<()> {
        let valid = sequence.is_valid_transition(&self.current_stage, next);
        debug!(
            state_id = %self.id,
            from = %self.current_stage,
            to = next,
            valid,
            "Validated stage transition"
        );
        if valid {
            Ok(())
        } else {
            Err(PipelineError::invalid_transition(
                Some(&self.current_stage),
                next,
            ))
        }
    }

    /// Folds a stage result into the state.
    ///
    /// A completed result stores its output, appends `stage_name` once and
    /// moves to `next` when given. Any other result stores its output with
    /// the error attached and leaves progress untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStage` for a name outside `sequence` and
    /// `InvalidTransition` for a `next` that is not adjacent. Nothing is
    /// modified on error.
    pub fn record_stage_result(
        &mut self,
        stage_name: &str,
        result: &StageResult,
        next: Option<&str>,
        sequence: &StageSequence,
    ) -> PipelineResult<()> {
        if !sequence.contains(stage_name) {
            return Err(PipelineError::invalid_stage(stage_name));
        }
        if let Some(next) = next {
            self.validate_transition_to(next, sequence)?;
        }

        self.artifacts
            .insert(stage_name.to_string(), result.artifact_payload());

        if result.is_success() {
            if !self.stages_completed.iter().any(|s| s == stage_name) {
                self.stages_completed.push(stage_name.to_string());
            }
            if let Some(next) = next {
                self.current_stage = next.to_string();
            }
        }
        Ok(())
    }

    /// Snapshots the progress fields and returns the new checkpoint id.
    ///
    /// Ids have the form `{name}_{YYYYmmdd_HHMMSS_ffffff}_{seq}`.
    pub fn create_checkpoint(&mut self, name: &str) -> String {
        let now = now_utc();
        self.checkpoint_seq += 1;
        let id = format!("{name}_{}_{}", checkpoint_stamp(&now), self.checkpoint_seq);

        self.checkpoint_data.insert(
            id.clone(),
            CheckpointSnapshot {
                current_stage: self.current_stage.clone(),
                stages_completed: self.stages_completed.clone(),
                artifacts: self.artifacts.clone(),
                timestamp: format_iso8601(&now),
                seq: self.checkpoint_seq,
            },
        );
        id
    }

    /// Restores the progress fields from a checkpoint.
    ///
    /// Checkpoints and feedback are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the checkpoint does not exist.
    pub fn rollback_to_checkpoint(&mut self, checkpoint_id: &str) -> PipelineResult<()> {
        let snapshot = self
            .checkpoint_data
            .get(checkpoint_id)
            .ok_or_else(|| PipelineError::not_found(EntityKind::Checkpoint, checkpoint_id))?;

        self.current_stage = snapshot.current_stage.clone();
        self.stages_completed = snapshot.stages_completed.clone();
        self.artifacts = snapshot.artifacts.clone();
        Ok(())
    }

    /// The checkpoint with the latest timestamp, ties broken by sequence.
    ///
    /// Checkpoints whose timestamp does not parse are skipped.
    #[must_use]
    pub fn latest_checkpoint_id(&self) -> Option<&str> {
        self.checkpoint_data
            .iter()
            .filter_map(|(id, snapshot)| match snapshot.parsed_timestamp() {
                Some(ts) => Some((ts, snapshot.seq, id)),
                None => {
                    warn!(
                        state_id = %self.id,
                        checkpoint_id = %id,
                        timestamp = %snapshot.timestamp,
                        "Skipping checkpoint with malformed timestamp"
                    );
                    None
                }
            })
            .max_by_key(|(ts, seq, _)| (*ts, *seq))
            .map(|(_, _, id)| id.as_str())
    }

    /// Checkpoint listing, newest first. Malformed timestamps sort last.
    #[must_use]
    pub fn checkpoint_summaries(&self) -> Vec<CheckpointSummary> {
        let mut entries: Vec<_> = self.checkpoint_data.iter().collect();
        entries.sort_by_key(|(_, snapshot)| Reverse((snapshot.parsed_timestamp(), snapshot.seq)));

        entries
            .into_iter()
            .map(|(id, snapshot)| CheckpointSummary {
                id: id.clone(),
                stage: snapshot.current_stage.clone(),
                timestamp: snapshot.timestamp.clone(),
            })
            .collect()
    }

    /// Appends a feedback item for `stage_name` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStage` if the stage is not in `sequence`.
    pub fn add_feedback(
        &mut self,
        stage_name: &str,
        content: impl Into<String>,
        feedback_type: FeedbackType,
        sequence: &StageSequence,
    ) -> PipelineResult<String> {
        if !sequence.contains(stage_name) {
            return Err(PipelineError::invalid_stage(stage_name));
        }
        let item = FeedbackItem::new(stage_name, content, feedback_type);
        let id = item.id.clone();
        self.feedback.push(item);
        Ok(id)
    }

    /// Marks the given feedback items incorporated.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for the first unknown id; nothing is marked then.
    pub fn mark_feedback_incorporated(&mut self, feedback_ids: &[String]) -> PipelineResult<()> {
        if let Some(missing) = feedback_ids
            .iter()
            .find(|id| !self.feedback.iter().any(|item| &item.id == *id))
        {
            return Err(PipelineError::not_found(EntityKind::Feedback, missing.as_str()));
        }

        for item in &mut self.feedback {
            if feedback_ids.contains(&item.id) {
                item.incorporated = true;
            }
        }
        Ok(())
    }

    /// Marks every feedback item incorporated. Returns how many changed.
    pub fn mark_all_feedback_incorporated(&mut self) -> usize {
        let mut changed = 0;
        for item in self.feedback.iter_mut().filter(|item| !item.incorporated) {
            item.incorporated = true;
            changed += 1;
        }
        changed
    }

    /// Feedback attached to one stage.
    #[must_use]
    pub fn feedback_for_stage(&self, stage_name: &str) -> Vec<&FeedbackItem> {
        self.feedback
            .iter()
            .filter(|item| item.stage_name == stage_name)
            .collect()
    }

    /// Feedback not yet incorporated.
    #[must_use]
    pub fn pending_feedback(&self) -> Vec<&FeedbackItem> {
        self.feedback.iter().filter(|item| !item.incorporated).collect()
    }
}
