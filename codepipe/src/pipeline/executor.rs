//! Runs one stage against one pipeline state.

use crate::core::StageSequence;
use crate::errors::{EntityKind, PipelineError, PipelineResult};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::SpanTimer;
use crate::repository::{run_in_transaction, PipelineRepository};
use crate::stages::{Stage, StageResult};
use crate::state::PipelineState;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Executes single stages: validates the transition, optionally
/// checkpoints, runs the stage and records its result.
pub struct PipelineExecutor {
    repository: Arc<dyn PipelineRepository>,
    sequence: StageSequence,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Creates an executor over `repository` for `sequence`.
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

    /// Executes `stage` against the state `state_id` and returns the saved
    /// state.
    ///
    /// See [`execute_stage_with_result`](Self::execute_stage_with_result).
    ///
    /// # Errors
    ///
    /// As for `execute_stage_with_result`.
    pub async fn execute_stage(
        &self,
        state_id: &str,
        stage: &dyn Stage,
        next_stage_name: Option<&str>,
        create_checkpoint: bool,
        use_transaction: bool,
    ) -> PipelineResult<PipelineState> {
        self.execute_stage_with_result(
            state_id,
            stage,
            next_stage_name,
            create_checkpoint,
            use_transaction,
        )
        .await
        .map(|(state, _)| state)
    }

    /// Executes `stage` and returns the saved state with the stage's result.
    ///
    /// The pipeline moves to `next_stage_name` when given, else to the
    /// stage's declared successor. A result that is not completed is stored
    /// as a diagnostic artifact and the pipeline stays on the stage.
    ///
    /// With `create_checkpoint` a `before_<stage>` checkpoint is saved before
    /// the stage runs. With `use_transaction` everything happens in one
    /// repository transaction that is aborted on any error.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown state or task.
    /// - `InvalidStage` for a stage outside the sequence.
    /// - `InvalidTransition` if the stage rejects its predecessor or the
    ///   `next_stage_name` override is not adjacent. Nothing is written in
    ///   either case. A declared successor is only checked once the stage
    ///   has completed.
    /// - `StageExecution` if the stage itself fails. Its result is not
    ///   recorded.
    pub async fn execute_stage_with_result(
        &self,
        state_id: &str,
        stage: &dyn Stage,
        next_stage_name: Option<&str>,
        create_checkpoint: bool,
        use_transaction: bool,
    ) -> PipelineResult<(PipelineState, StageResult)> {
        if use_transaction {
            run_in_transaction(self.repository.as_ref(), || {
                self.run_stage(state_id, stage, next_stage_name, create_checkpoint)
            })
            .await
        } else {
            self.run_stage(state_id, stage, next_stage_name, create_checkpoint)
                .await
        }
    }

    async fn run_stage(
        &self,
        state_id: &str,
        stage: &dyn Stage,
        next_stage_name: Option<&str>,
        create_checkpoint: bool,
    ) -> PipelineResult<(PipelineState, StageResult)> {
        let mut state = self
            .repository
            .get_pipeline_state(state_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(EntityKind::PipelineState, state_id))?;
        let task = self
            .repository
            .get_task(&state.task_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Task, state.task_id.as_str()))?;

        let stage_name = stage.name();
        if !self.sequence.contains(stage_name) {
            return Err(PipelineError::invalid_stage(stage_name));
        }

        let previous = state.previous_stage();
        if !stage.validate_transition_from_name(previous) {
            warn!(
                state_id = %state_id,
                stage = %stage_name,
                previous = previous.unwrap_or("<none>"),
                "Stage rejected its predecessor"
            );
            return Err(PipelineError::invalid_transition(previous, stage_name));
        }

        if let Some(next) = next_stage_name {
            state.validate_transition_to(next, &self.sequence)?;
        }

        if create_checkpoint {
            let checkpoint_id = state.create_checkpoint(&format!("before_{stage_name}"));
            state = self.repository.save_pipeline_state(&state).await?;
            info!(
                state_id = %state_id,
                checkpoint_id = %checkpoint_id,
                stage = %stage_name,
                "Created checkpoint before stage"
            );
            self.emit(
                PipelineEvent::new(EventKind::CheckpointCreated, state_id).with_data(
                    serde_json::json!({ "checkpoint_id": checkpoint_id, "stage": stage_name }),
                ),
            )
            .await;
        }

        info!(state_id = %state_id, task_id = %task.id, stage = %stage_name, "Executing stage");
        self.emit(
            PipelineEvent::new(EventKind::StageStarted, state_id)
                .with_data(serde_json::json!({ "stage": stage_name })),
        )
        .await;

        let timer = SpanTimer::start(format!("stage:{stage_name}"));
        let result = match stage.execute(&task, &state).await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    state_id = %state_id,
                    stage = %stage_name,
                    duration_ms = timer.finish(),
                    error = %err,
                    "Stage execution failed"
                );
                return Err(err.into());
            }
        };
        let duration_ms = timer.finish();

        let next = if result.is_success() {
            next_stage_name.or_else(|| stage.next_stage_name())
        } else {
            None
        };
        state.record_stage_result(stage_name, &result, next, &self.sequence)?;
        let state = self.repository.save_pipeline_state(&state).await?;

        if result.is_success() {
            info!(
                state_id = %state_id,
                stage = %stage_name,
                next = next.unwrap_or("<end>"),
                duration_ms,
                "Stage completed"
            );
            self.emit(
                PipelineEvent::new(EventKind::StageCompleted, state_id).with_data(
                    serde_json::json!({
                        "stage": stage_name,
                        "next": next,
                        "duration_ms": duration_ms,
                    }),
                ),
            )
            .await;
        } else {
            warn!(
                state_id = %state_id,
                stage = %stage_name,
                status = %result.status,
                error = result.error.as_deref().unwrap_or(""),
                duration_ms,
                "Stage did not complete, pipeline parked"
            );
            self.emit(
                PipelineEvent::new(EventKind::StageParked, state_id).with_data(
                    serde_json::json!({
                        "stage": stage_name,
                        "status": result.status,
                        "error": result.error,
                    }),
                ),
            )
            .await;
        }
        debug!(state_id = %state_id, version = state.version, "Saved stage result");

        Ok((state, result))
    }

    async fn emit(&self, event: PipelineEvent) {
        self.events.emit(event).await;
    }
}
