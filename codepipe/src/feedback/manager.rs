//! Feedback collection and incorporation.

use crate::core::{FeedbackType, StageSequence};
use crate::errors::{EntityKind, PipelineError, PipelineResult};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::repository::{run_in_transaction, PipelineRepository};
use crate::state::{FeedbackItem, PipelineState};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Orders feedback for incorporation: corrections, then suggestions, then
/// enhancements. Submission order is kept within each type.
#[must_use]
pub fn prioritize_feedback(items: &[FeedbackItem]) -> Vec<&FeedbackItem> {
    let mut ordered: Vec<&FeedbackItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.feedback_type.priority());
    ordered
}

/// Manages the feedback log of pipeline states.
pub struct FeedbackManager {
    repository: Arc<dyn PipelineRepository>,
    sequence: StageSequence,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for FeedbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackManager")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl FeedbackManager {
    /// Creates a manager over `repository`; stage names are checked against
    /// `sequence`.
    #[must_use]
    pub fn new(repository: Arc<dyn PipelineRepository>, sequence: StageSequence) -> Self {
        Self {
            repository,
            sequence,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    async fn load(&self, state_id: &str) -> PipelineResult<PipelineState> {
        self.repository
            .get_pipeline_state(state_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(EntityKind::PipelineState, state_id))
    }

    /// Attaches feedback to a stage. Returns the new item's id and the saved
    /// state.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state, `InvalidStage` for a stage outside
    /// the sequence.
    pub async fn submit_feedback(
        &self,
        state_id: &str,
        stage_name: &str,
        content: &str,
        feedback_type: FeedbackType,
    ) -> PipelineResult<(String, PipelineState)> {
        let mut state = self.load(state_id).await?;
        let feedback_id = state.add_feedback(stage_name, content, feedback_type, &self.sequence)?;
        let state = self.repository.save_pipeline_state(&state).await?;

        info!(
            state_id = %state_id,
            stage = %stage_name,
            feedback_id = %feedback_id,
            feedback_type = %feedback_type,
            "Submitted feedback"
        );
        self.events
            .emit(
                PipelineEvent::new(EventKind::FeedbackSubmitted, state_id).with_data(
                    serde_json::json!({
                        "feedback_id": feedback_id,
                        "stage": stage_name,
                        "type": feedback_type,
                    }),
                ),
            )
            .await;
        Ok((feedback_id, state))
    }

    /// Marks specific feedback items incorporated.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state or any unknown feedback id; in the
    /// latter case nothing is marked.
    pub async fn incorporate_feedback(
        &self,
        state_id: &str,
        feedback_ids: &[String],
    ) -> PipelineResult<PipelineState> {
        let mut state = self.load(state_id).await?;
        state.mark_feedback_incorporated(feedback_ids)?;
        let state = self.repository.save_pipeline_state(&state).await?;

        info!(state_id = %state_id, count = feedback_ids.len(), "Incorporated feedback");
        self.emit_incorporated(state_id, feedback_ids.to_vec()).await;
        Ok(state)
    }

    /// Marks every feedback item incorporated, in priority order.
    ///
    /// A state without feedback is returned unchanged and not saved.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state, or a save failure.
    pub async fn incorporate_all_feedback(&self, state_id: &str) -> PipelineResult<PipelineState> {
        let mut state = self.load(state_id).await?;
        if state.feedback.is_empty() {
            return Ok(state);
        }

        let ordered: Vec<String> = prioritize_feedback(&state.feedback)
            .into_iter()
            .map(|item| item.id.clone())
            .collect();
        debug!(state_id = %state_id, order = ?ordered, "Prioritized feedback");

        state.mark_all_feedback_incorporated();
        let state = self.repository.save_pipeline_state(&state).await?;

        info!(state_id = %state_id, count = ordered.len(), "Incorporated all feedback");
        self.emit_incorporated(state_id, ordered).await;
        Ok(state)
    }

    async fn emit_incorporated(&self, state_id: &str, feedback_ids: Vec<String>) {
        self.events
            .emit(
                PipelineEvent::new(EventKind::FeedbackIncorporated, state_id)
                    .with_data(serde_json::json!({ "feedback_ids": feedback_ids })),
            )
            .await;
    }

    /// All feedback of a state, in submission order.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state.
    pub async fn get_feedback(&self, state_id: &str) -> PipelineResult<Vec<FeedbackItem>> {
        Ok(self.load(state_id).await?.feedback)
    }

    /// Feedback attached to one stage.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state, `InvalidStage` for a stage outside
    /// the sequence.
    pub async fn get_feedback_by_stage(
        &self,
        state_id: &str,
        stage_name: &str,
    ) -> PipelineResult<Vec<FeedbackItem>> {
        let state = self.load(state_id).await?;
        if !self.sequence.contains(stage_name) {
            return Err(PipelineError::invalid_stage(stage_name));
        }
        Ok(state
            .feedback_for_stage(stage_name)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Feedback not yet incorporated.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state.
    pub async fn pending_feedback(&self, state_id: &str) -> PipelineResult<Vec<FeedbackItem>> {
        let state = self.load(state_id).await?;
        Ok(state.pending_feedback().into_iter().cloned().collect())
    }

    /// Runs `op` in a repository transaction.
    ///
    /// # Errors
    ///
    /// The error of `op`, or a transaction failure.
    pub async fn transaction<T, F, Fut>(&self, op: F) -> PipelineResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        run_in_transaction(self.repository.as_ref(), op).await
    }
}
