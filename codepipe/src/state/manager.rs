//! Lifecycle operations over persisted pipeline states.

use super::{CheckpointSummary, PipelineState};
use crate::core::{StageSequence, Task};
use crate::errors::{EntityKind, PipelineError, PipelineResult};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::repository::{run_in_transaction, PipelineRepository};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// How far a pipeline has progressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    /// Stage the pipeline is on.
    pub current_stage: String,
    /// Number of completed stages.
    pub completed_stages: usize,
    /// Number of stages in the sequence.
    pub total_stages: usize,
    /// `completed_stages / total_stages * 100`, or 0 for an empty sequence.
    pub percentage: f64,
}

/// Creates, checkpoints, rolls back and reports on pipeline states.
pub struct StateManager {
    repository: Arc<dyn PipelineRepository>,
    sequence: StageSequence,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl StateManager {
    /// Creates a manager over `repository` for `sequence`.
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

    /// The stage sequence states are validated against.
    #[must_use]
    pub fn sequence(&self) -> &StageSequence {
        &self.sequence
    }

    /// Creates and persists a state at the first stage.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty sequence, `NotFound` if the task is not
    /// stored, or a repository error.
    pub async fn create_initial_state(&self, task: &Task) -> PipelineResult<PipelineState> {
        let state = PipelineState::new(&task.id, &self.sequence)?;
        let state = self.repository.save_pipeline_state(&state).await?;
        info!(
            state_id = %state.id,
            task_id = %task.id,
            stage = %state.current_stage,
            "Created initial pipeline state"
        );
        Ok(state)
    }

    /// Loads a state.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such state.
    pub async fn get_pipeline_state(&self, state_id: &str) -> PipelineResult<PipelineState> {
        self.repository
            .get_pipeline_state(state_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(EntityKind::PipelineState, state_id))
    }

    /// The most recent state for a task, if the task was ever run.
    ///
    /// # Errors
    ///
    /// Repository failures only.
    pub async fn get_latest_pipeline_state(
        &self,
        task_id: &str,
    ) -> PipelineResult<Option<PipelineState>> {
        self.repository.get_latest_pipeline_state(task_id).await
    }

    /// Stores a checkpoint named after `name` and returns its id with the
    /// saved state.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such state, or a save failure.
    pub async fn create_checkpoint(
        &self,
        state_id: &str,
        name: &str,
    ) -> PipelineResult<(String, PipelineState)> {
        let mut state = self.get_pipeline_state(state_id).await?;
        let checkpoint_id = state.create_checkpoint(name);
        let state = self.repository.save_pipeline_state(&state).await?;

        info!(
            state_id = %state.id,
            checkpoint_id = %checkpoint_id,
            stage = %state.current_stage,
            "Created checkpoint"
        );
        self.events
            .emit(
                PipelineEvent::new(EventKind::CheckpointCreated, &state.id).with_data(
                    serde_json::json!({
                        "checkpoint_id": checkpoint_id,
                        "stage": state.current_stage,
                    }),
                ),
            )
            .await;
        Ok((checkpoint_id, state))
    }

    /// Restores progress from a checkpoint and persists it.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state or checkpoint, or a save failure.
    pub async fn rollback_to_checkpoint(
        &self,
        state_id: &str,
        checkpoint_id: &str,
    ) -> PipelineResult<PipelineState> {
        let mut state = self.get_pipeline_state(state_id).await?;
        self.rollback_loaded(&mut state, checkpoint_id).await
    }

    /// Restores progress from the newest checkpoint.
    ///
    /// Returns `None` when the state has no checkpoint with a valid
    /// timestamp.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown state, or a save failure.
    pub async fn rollback_to_latest_checkpoint(
        &self,
        state_id: &str,
    ) -> PipelineResult<Option<PipelineState>> {
        let mut state = self.get_pipeline_state(state_id).await?;
        let Some(checkpoint_id) = state.latest_checkpoint_id().map(String::from) else {
            warn!(state_id = %state_id, "No valid checkpoint to roll back to");
            return Ok(None);
        };
        self.rollback_loaded(&mut state, &checkpoint_id)
            .await
            .map(Some)
    }

    async fn rollback_loaded(
        &self,
        state: &mut PipelineState,
        checkpoint_id: &str,
    ) -> PipelineResult<PipelineState> {
        let from_stage = state.current_stage.clone();
        state.rollback_to_checkpoint(checkpoint_id)?;
        let state = self.repository.save_pipeline_state(state).await?;

        info!(
            state_id = %state.id,
            checkpoint_id = %checkpoint_id,
            from = %from_stage,
            to = %state.current_stage,
            "Rolled back to checkpoint"
        );
        self.events
            .emit(
                PipelineEvent::new(EventKind::PipelineRollback, &state.id).with_data(
                    serde_json::json!({
                        "checkpoint_id": checkpoint_id,
                        "from": from_stage,
                        "to": state.current_stage,
                    }),
                ),
            )
            .await;
        Ok(state)
    }

    /// Reports progress through the sequence.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such state.
    pub async fn get_pipeline_progress(&self, state_id: &str) -> PipelineResult<PipelineProgress> {
        let state = self.get_pipeline_state(state_id).await?;
        let completed_stages = state.stages_completed.len();
        let total_stages = self.sequence.len();
        let percentage = if total_stages == 0 {
            0.0
        } else {
            completed_stages as f64 / total_stages as f64 * 100.0
        };

        Ok(PipelineProgress {
            current_stage: state.current_stage,
            completed_stages,
            total_stages,
            percentage,
        })
    }

    /// Lists checkpoints, newest first.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such state.
    pub async fn list_checkpoints(&self, state_id: &str) -> PipelineResult<Vec<CheckpointSummary>> {
        Ok(self
            .get_pipeline_state(state_id)
            .await?
            .checkpoint_summaries())
    }

    /// Whether `next` may follow `current`: the same stage or the one after it.
    #[must_use]
    pub fn is_valid_transition(&self, current: &str, next: &str) -> bool {
        self.sequence.is_valid_transition(current, next)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::repository::InMemoryPipelineRepository;
    use crate::stages::StageResult;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    async fn setup() -> (Arc<InMemoryPipelineRepository>, StateManager, Task) {
        let repo = Arc::new(InMemoryPipelineRepository::new());
        let task = Task::new("Build a CLI", vec!["parse args".to_string()]).unwrap();
        repo.save_task(&task).await.unwrap();
        let manager = StateManager::new(repo.clone(), StageSequence::default());
        (repo, manager, task)
    }

    async fn complete_stages(
        repo: &InMemoryPipelineRepository,
        state: PipelineState,
        count: usize,
    ) -> PipelineState {
        let seq = StageSequence::default();
        let mut state = state;
        let pending: Vec<String> = seq
            .stages()
            .iter()
            .take(count)
            .filter(|stage| !state.stages_completed.contains(stage))
            .cloned()
            .collect();
        for stage in &pending {
            let result = StageResult::completed(stage.as_str(), HashMap::new())
                .with_output("stage", serde_json::json!(stage));
            state
                .record_stage_result(stage, &result, seq.next_after(stage), &seq)
                .unwrap();
        }
        repo.save_pipeline_state(&state).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_initial_state() {
        let (_, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();

        assert_eq!(state.current_stage, "requirements_gathering");
        assert!(state.stages_completed.is_empty());
        assert_eq!(state.task_id, task.id);

        let loaded = manager.get_pipeline_state(&state.id).await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_initial_state_for_unknown_task_fails() {
        let (_, manager, _) = setup().await;
        let ghost = Task::new("ghost", vec!["x".to_string()]).unwrap();
        let err = manager.create_initial_state(&ghost).await.unwrap_err();
        assert!(err.is_not_found_kind(EntityKind::Task));
    }

    #[tokio::test]
    async fn test_get_missing_state_is_not_found() {
        let (_, manager, task) = setup().await;
        let err = manager.get_pipeline_state("missing").await.unwrap_err();
        assert!(err.is_not_found_kind(EntityKind::PipelineState));

        assert!(manager
            .get_latest_pipeline_state(&task.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_progress_percentage() {
        let (repo, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();
        let state = complete_stages(&repo, state, 2).await;

        let progress = manager.get_pipeline_progress(&state.id).await.unwrap();
        assert_eq!(
            progress,
            PipelineProgress {
                current_stage: "implementation_planning".to_string(),
                completed_stages: 2,
                total_stages: 5,
                percentage: 40.0,
            }
        );
    }

    #[tokio::test]
    async fn test_progress_with_empty_sequence() {
        let (repo, _, task) = setup().await;
        let seeded = PipelineState::new(&task.id, &StageSequence::default()).unwrap();
        let seeded = repo.save_pipeline_state(&seeded).await.unwrap();

        let manager = StateManager::new(repo.clone(), StageSequence::new(Vec::<String>::new()));
        let progress = manager.get_pipeline_progress(&seeded.id).await.unwrap();
        assert_eq!(progress.total_stages, 0);
        assert_eq!(progress.percentage, 0.0);
    }

    #[tokio::test]
    async fn test_checkpoint_and_rollback_round_trip() {
        let (repo, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();
        let state = complete_stages(&repo, state, 1).await;

        let (checkpoint_id, checkpointed) =
            manager.create_checkpoint(&state.id, "x").await.unwrap();
        let advanced = complete_stages(&repo, checkpointed.clone(), 3).await;
        assert_eq!(advanced.current_stage, "implementation_writing");

        let restored = manager
            .rollback_to_checkpoint(&state.id, &checkpoint_id)
            .await
            .unwrap();

        assert_eq!(restored.current_stage, checkpointed.current_stage);
        assert_eq!(restored.stages_completed, checkpointed.stages_completed);
        assert_eq!(restored.artifacts, checkpointed.artifacts);
        assert_eq!(restored.checkpoint_data.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_to_unknown_checkpoint() {
        let (_, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();
        let err = manager
            .rollback_to_checkpoint(&state.id, "nope")
            .await
            .unwrap_err();
        assert!(err.is_not_found_kind(EntityKind::Checkpoint));
    }

    #[tokio::test]
    async fn test_rollback_to_latest_without_checkpoints() {
        let (_, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();
        let result = manager.rollback_to_latest_checkpoint(&state.id).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_rollback_to_latest_picks_newest() {
        let (repo, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();
        manager.create_checkpoint(&state.id, "start").await.unwrap();
        let state = manager.get_pipeline_state(&state.id).await.unwrap();
        let state = complete_stages(&repo, state, 2).await;
        manager.create_checkpoint(&state.id, "later").await.unwrap();
        let state = manager.get_pipeline_state(&state.id).await.unwrap();
        complete_stages(&repo, state.clone(), 4).await;

        let restored = manager
            .rollback_to_latest_checkpoint(&state.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.current_stage, "implementation_planning");
        assert_eq!(restored.stages_completed.len(), 2);
    }

    #[tokio::test]
    async fn test_list_checkpoints_newest_first() {
        let (_, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();
        let (first, _) = manager.create_checkpoint(&state.id, "a").await.unwrap();
        let (second, _) = manager.create_checkpoint(&state.id, "b").await.unwrap();

        let listed = manager.list_checkpoints(&state.id).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(listed[0].stage, "requirements_gathering");
    }

    #[tokio::test]
    async fn test_is_valid_transition() {
        let (_, manager, _) = setup().await;
        assert!(manager.is_valid_transition("requirements_gathering", "requirements_gathering"));
        assert!(manager.is_valid_transition("requirements_gathering", "knowledge_gathering"));
        assert!(!manager.is_valid_transition("requirements_gathering", "review"));
        assert!(!manager.is_valid_transition("knowledge_gathering", "requirements_gathering"));
        assert!(!manager.is_valid_transition("deploy", "review"));
    }

    #[tokio::test]
    async fn test_checkpoint_and_rollback_emit_events() {
        let (repo, _, task) = setup().await;
        let sink = Arc::new(CollectingEventSink::new());
        let manager = StateManager::new(repo.clone(), StageSequence::default())
            .with_event_sink(sink.clone());

        let state = manager.create_initial_state(&task).await.unwrap();
        let (checkpoint_id, _) = manager.create_checkpoint(&state.id, "x").await.unwrap();
        manager
            .rollback_to_checkpoint(&state.id, &checkpoint_id)
            .await
            .unwrap();

        assert_eq!(
            sink.kinds(),
            vec![EventKind::CheckpointCreated, EventKind::PipelineRollback]
        );
        let created = &sink.events()[0];
        assert_eq!(created.data["checkpoint_id"], serde_json::json!(checkpoint_id));
    }

    #[tokio::test]
    async fn test_transaction_aborts_on_error() {
        let (repo, manager, task) = setup().await;
        let state = manager.create_initial_state(&task).await.unwrap();

        let result: PipelineResult<()> = manager
            .transaction(|| async {
                manager.create_checkpoint(&state.id, "doomed").await.unwrap();
                Err(PipelineError::Repository("boom".to_string()))
            })
            .await;

        assert!(result.is_err());
        let reloaded = repo.get_pipeline_state(&state.id).await.unwrap().unwrap();
        assert!(reloaded.checkpoint_data.is_empty());
    }
}
