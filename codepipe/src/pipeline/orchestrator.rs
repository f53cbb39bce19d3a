//! Drives the executor across the whole stage sequence.

use super::PipelineExecutor;
use crate::config::{EngineConfig, RunOptions};
use crate::core::{StageSequence, Task};
use crate::errors::{EntityKind, PipelineError, PipelineResult};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::feedback::{FeedbackManager, FeedbackPrompter, NeverIncorporate};
use crate::repository::PipelineRepository;
use crate::stages::{Stage, StageFactory};
use crate::state::{PipelineState, StateManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage completed.
    Completed,
    /// A stage did not complete, or could not be built; the pipeline waits
    /// on `stage` for a retry.
    Parked {
        /// Stage the pipeline is parked on.
        stage: String,
    },
    /// A stage failed and no checkpoint could recover the run.
    Stalled {
        /// Stage the pipeline is parked on.
        stage: String,
        /// The error that stopped the run.
        error: String,
    },
}

/// Result of [`PipelineOrchestrator::execute_pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    /// The latest persisted state.
    pub state: PipelineState,
    /// Why the run stopped.
    pub outcome: RunOutcome,
}

impl PipelineRun {
    /// Returns true if every stage completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }
}

/// Runs tasks through the stage sequence.
///
/// Stages are built per iteration by the injected [`StageFactory`]. A stage
/// error triggers a rollback to the latest checkpoint, at most
/// `max_recoveries` times per run; once stages have started running, errors
/// end the run with a [`RunOutcome`] instead of being returned.
pub struct PipelineOrchestrator {
    repository: Arc<dyn PipelineRepository>,
    sequence: StageSequence,
    executor: PipelineExecutor,
    state_manager: StateManager,
    feedback_manager: FeedbackManager,
    stage_factory: Arc<dyn StageFactory>,
    prompter: Arc<dyn FeedbackPrompter>,
    events: Arc<dyn EventSink>,
    single_stage_checkpoint: bool,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("sequence", &self.sequence)
            .field("single_stage_checkpoint", &self.single_stage_checkpoint)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with no event sink and a prompter that never
    /// incorporates feedback.
    #[must_use]
    pub fn new(
        repository: Arc<dyn PipelineRepository>,
        stage_factory: Arc<dyn StageFactory>,
        sequence: StageSequence,
    ) -> Self {
        let events: Arc<dyn EventSink> = Arc::new(NoOpEventSink);
        Self {
            executor: PipelineExecutor::new(repository.clone(), sequence.clone()),
            state_manager: StateManager::new(repository.clone(), sequence.clone()),
            feedback_manager: FeedbackManager::new(repository.clone(), sequence.clone()),
            repository,
            sequence,
            stage_factory,
            prompter: Arc::new(NeverIncorporate),
            events,
            single_stage_checkpoint: true,
        }
    }

    /// Creates an orchestrator using the stage sequence and single-stage
    /// checkpoint default of `config`.
    #[must_use]
    pub fn from_config(
        repository: Arc<dyn PipelineRepository>,
        stage_factory: Arc<dyn StageFactory>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(repository, stage_factory, config.sequence())
            .with_single_stage_checkpoint(config.single_stage_checkpoint)
    }

    /// Sends events from the orchestrator and every component it owns to
    /// `events`.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.executor = PipelineExecutor::new(self.repository.clone(), self.sequence.clone())
            .with_event_sink(events.clone());
        self.state_manager = StateManager::new(self.repository.clone(), self.sequence.clone())
            .with_event_sink(events.clone());
        self.feedback_manager =
            FeedbackManager::new(self.repository.clone(), self.sequence.clone())
                .with_event_sink(events.clone());
        self.events = events;
        self
    }

    /// Sets the prompter consulted when a run waits for feedback.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn FeedbackPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Sets whether `execute_single_stage` checkpoints by default.
    #[must_use]
    pub fn with_single_stage_checkpoint(mut self, enabled: bool) -> Self {
        self.single_stage_checkpoint = enabled;
        self
    }

    /// The stage sequence.
    #[must_use]
    pub fn sequence(&self) -> &StageSequence {
        &self.sequence
    }

    /// The executor used for every stage.
    #[must_use]
    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// The state manager used for initial states and recovery.
    #[must_use]
    pub fn state_manager(&self) -> &StateManager {
        &self.state_manager
    }

    /// The feedback manager used during feedback pauses.
    #[must_use]
    pub fn feedback_manager(&self) -> &FeedbackManager {
        &self.feedback_manager
    }

    async fn load_task(&self, task_id: &str) -> PipelineResult<Task> {
        self.repository
            .get_task(task_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Task, task_id))
    }

    /// Runs the task from its current stage until the pipeline completes,
    /// parks or stalls.
    ///
    /// # Errors
    ///
    /// Only failures before the first stage runs: `NotFound` for an unknown
    /// task, `InvalidStage` for a resumed state whose stage is not in the
    /// sequence, or a repository error while creating the initial state.
    pub async fn execute_pipeline(
        &self,
        task_id: &str,
        options: &RunOptions,
    ) -> PipelineResult<PipelineRun> {
        let task = self.load_task(task_id).await?;

        let resumed = if options.continue_from_current {
            self.state_manager.get_latest_pipeline_state(task_id).await?
        } else {
            None
        };
        let mut state = match resumed {
            Some(state) => {
                info!(
                    task_id = %task_id,
                    state_id = %state.id,
                    stage = %state.current_stage,
                    "Continuing pipeline from current stage"
                );
                state
            }
            None => self.state_manager.create_initial_state(&task).await?,
        };

        if state.is_complete(&self.sequence) {
            info!(state_id = %state.id, "Pipeline already complete");
            return Ok(PipelineRun {
                state,
                outcome: RunOutcome::Completed,
            });
        }

        let mut index = self
            .sequence
            .position(&state.current_stage)
            .ok_or_else(|| PipelineError::invalid_stage(state.current_stage.as_str()))?;
        let mut recoveries = 0;

        info!(
            task_id = %task_id,
            state_id = %state.id,
            stage = %state.current_stage,
            "Starting pipeline run"
        );

        while let Some(stage_name) = self.sequence.get(index) {
            let Some(stage) = self.stage_factory.create_stage(stage_name) else {
                error!(state_id = %state.id, stage = %stage_name, "Failed to create stage, skipping");
                index += 1;
                continue;
            };

            let step = self.run_step(&state.id, stage.as_ref(), options).await;
            let err = match step {
                Ok(Step::Advanced(updated)) => {
                    index = self
                        .sequence
                        .position(&updated.current_stage)
                        .unwrap_or(index + 1);
                    state = updated;
                    continue;
                }
                Ok(Step::Finished(updated)) => {
                    state = updated;
                    break;
                }
                Ok(Step::Parked(updated, error)) => {
                    let stage = updated.current_stage.clone();
                    warn!(
                        state_id = %updated.id,
                        stage = %stage,
                        error = error.as_deref().unwrap_or(""),
                        "Pipeline parked on incomplete stage"
                    );
                    self.emit_stalled(&updated.id, &stage, error.as_deref()).await;
                    return Ok(PipelineRun {
                        state: updated,
                        outcome: RunOutcome::Parked { stage },
                    });
                }
                Err(err) => err,
            };

            error!(
                state_id = %state.id,
                stage = %stage_name,
                error = %err,
                "Error executing stage"
            );
            let recovered = self
                .recover(&state.id, &mut recoveries, options.max_recoveries)
                .await;
            match recovered {
                Some((restored, restored_index)) => {
                    state = restored;
                    index = restored_index;
                }
                None => return Ok(self.stall(state, &err).await),
            }
        }

        Ok(self.finish(state).await)
    }

    /// Runs one stage built by the factory against an existing state.
    ///
    /// `create_checkpoint` of `None` uses the orchestrator's default (on
    /// unless configured otherwise).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown task or state, `Validation` if the state
    /// belongs to another task, `InvalidStage` if the factory cannot build
    /// `stage_name`, and any executor error.
    pub async fn execute_single_stage(
        &self,
        task_id: &str,
        state_id: &str,
        stage_name: &str,
        create_checkpoint: Option<bool>,
    ) -> PipelineResult<PipelineState> {
        info!(task_id = %task_id, state_id = %state_id, stage = %stage_name, "Executing single stage");
        self.load_task(task_id).await?;
        let state = self.state_manager.get_pipeline_state(state_id).await?;
        if state.task_id != task_id {
            return Err(PipelineError::Validation(format!(
                "pipeline state {state_id} belongs to task {}, not {task_id}",
                state.task_id
            )));
        }

        let stage = self
            .stage_factory
            .create_stage(stage_name)
            .ok_or_else(|| PipelineError::invalid_stage(stage_name))?;

        self.executor
            .execute_stage(
                state_id,
                stage.as_ref(),
                None,
                create_checkpoint.unwrap_or(self.single_stage_checkpoint),
                false,
            )
            .await
    }

    async fn run_step(
        &self,
        state_id: &str,
        stage: &dyn Stage,
        options: &RunOptions,
    ) -> PipelineResult<Step> {
        let (state, result) = self
            .executor
            .execute_stage_with_result(
                state_id,
                stage,
                None,
                options.create_checkpoints,
                options.use_transactions,
            )
            .await?;

        if !result.is_success() {
            return Ok(Step::Parked(state, result.error));
        }
        if stage.next_stage_name().is_none() {
            return Ok(Step::Finished(state));
        }
        let state = if options.wait_for_feedback {
            self.pause_for_feedback(state, stage.name()).await?
        } else {
            state
        };
        Ok(Step::Advanced(state))
    }

    async fn pause_for_feedback(
        &self,
        state: PipelineState,
        completed_stage: &str,
    ) -> PipelineResult<PipelineState> {
        let progress = self.state_manager.get_pipeline_progress(&state.id).await?;
        let incorporate = match self
            .prompter
            .confirm_incorporation(completed_stage, &progress)
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                warn!(state_id = %state.id, error = %err, "Feedback prompt failed, continuing");
                false
            }
        };

        if incorporate {
            info!(state_id = %state.id, stage = %completed_stage, "Incorporating feedback");
            self.feedback_manager.incorporate_all_feedback(&state.id).await
        } else {
            Ok(state)
        }
    }

    /// Rolls back to the latest checkpoint if the budget allows. Returns the
    /// restored state and the index of its stage.
    async fn recover(
        &self,
        state_id: &str,
        recoveries: &mut u32,
        max_recoveries: u32,
    ) -> Option<(PipelineState, usize)> {
        if *recoveries >= max_recoveries {
            warn!(state_id = %state_id, recoveries = *recoveries, "Recovery budget exhausted");
            return None;
        }

        match self.state_manager.rollback_to_latest_checkpoint(state_id).await {
            Ok(Some(restored)) => {
                let index = self.sequence.position(&restored.current_stage)?;
                *recoveries += 1;
                info!(
                    state_id = %state_id,
                    stage = %restored.current_stage,
                    attempt = *recoveries,
                    "Recovered from checkpoint"
                );
                Some((restored, index))
            }
            Ok(None) => None,
            Err(err) => {
                error!(state_id = %state_id, error = %err, "Rollback failed");
                None
            }
        }
    }

    async fn stall(&self, state: PipelineState, err: &PipelineError) -> PipelineRun {
        let state_id = state.id.clone();
        let state = self
            .state_manager
            .get_pipeline_state(&state_id)
            .await
            .unwrap_or(state);
        let stage = state.current_stage.clone();

        error!(
            state_id = %state_id,
            stage = %stage,
            error = %err,
            "Pipeline stalled, no checkpoint to recover from"
        );
        let message = err.to_string();
        self.emit_stalled(&state_id, &stage, Some(&message)).await;
        PipelineRun {
            state,
            outcome: RunOutcome::Stalled {
                stage,
                error: message,
            },
        }
    }

    async fn finish(&self, state: PipelineState) -> PipelineRun {
        if state.is_complete(&self.sequence) {
            info!(state_id = %state.id, "Pipeline completed");
            self.events
                .emit(
                    PipelineEvent::new(EventKind::PipelineCompleted, &state.id).with_data(
                        serde_json::json!({ "stages_completed": state.stages_completed }),
                    ),
                )
                .await;
            return PipelineRun {
                state,
                outcome: RunOutcome::Completed,
            };
        }

        let stage = state.current_stage.clone();
        warn!(state_id = %state.id, stage = %stage, "Pipeline ended before the terminal stage");
        self.emit_stalled(&state.id, &stage, None).await;
        PipelineRun {
            state,
            outcome: RunOutcome::Parked { stage },
        }
    }

    async fn emit_stalled(&self, state_id: &str, stage: &str, error: Option<&str>) {
        self.events
            .emit(
                PipelineEvent::new(EventKind::PipelineStalled, state_id)
                    .with_data(serde_json::json!({ "stage": stage, "error": error })),
            )
            .await;
    }
}

enum Step {
    Advanced(PipelineState),
    Finished(PipelineState),
    Parked(PipelineState, Option<String>),
}
