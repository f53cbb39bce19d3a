//! An in-memory engine wired up around one saved task.

use super::ScriptedStage;
use crate::core::{StageSequence, Task};
use crate::events::CollectingEventSink;
use crate::feedback::{FeedbackPrompter, NeverIncorporate};
use crate::pipeline::PipelineOrchestrator;
use crate::repository::{InMemoryPipelineRepository, PipelineRepository};
use crate::stages::{Stage, StageRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Repository, event sink, scripted stages and a saved task.
///
/// Every stage of the sequence starts as a [`ScriptedStage`] that completes.
/// Script them through [`stage`](Self::stage); build an orchestrator with
/// [`orchestrator`](Self::orchestrator) after scripting or at any time, since
/// scripted stages share their script with the copies the factory hands out.
pub struct PipelineHarness {
    /// The backing repository.
    pub repository: Arc<InMemoryPipelineRepository>,
    /// Every event emitted by the engine.
    pub events: Arc<CollectingEventSink>,
    /// The stage sequence.
    pub sequence: StageSequence,
    /// The saved task.
    pub task: Task,
    stages: BTreeMap<String, ScriptedStage>,
    prompter: Arc<dyn FeedbackPrompter>,
}

impl std::fmt::Debug for PipelineHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHarness")
            .field("sequence", &self.sequence)
            .field("task", &self.task.id)
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PipelineHarness {
    /// Harness for the default code-generation stages.
    ///
    /// # Errors
    ///
    /// Fails if the task cannot be created or saved.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_sequence(StageSequence::default()).await
    }

    /// Harness for a custom sequence.
    ///
    /// # Errors
    ///
    /// Fails if the task cannot be created or saved.
    pub async fn with_sequence(sequence: StageSequence) -> anyhow::Result<Self> {
        let repository = Arc::new(InMemoryPipelineRepository::new());
        let task = Task::new(
            "Implement a rate limiter",
            vec!["token bucket".to_string(), "per-client limits".to_string()],
        )?;
        repository.save_task(&task).await?;

        let stages = sequence
            .stages()
            .iter()
            .map(|name| (name.clone(), ScriptedStage::new(name.as_str(), &sequence)))
            .collect();

        Ok(Self {
            repository,
            events: Arc::new(CollectingEventSink::new()),
            sequence,
            task,
            stages,
            prompter: Arc::new(NeverIncorporate),
        })
    }

    /// The scripted stage registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if no stage is registered under `name`.
    #[must_use]
    pub fn stage(&self, name: &str) -> &ScriptedStage {
        match self.stages.get(name) {
            Some(stage) => stage,
            None => panic!("no scripted stage named {name}"),
        }
    }

    /// Replaces the stage registered under its own name.
    #[must_use]
    pub fn with_stage(mut self, stage: ScriptedStage) -> Self {
        self.stages.insert(stage.name().to_string(), stage);
        self
    }

    /// Unregisters a stage, so the factory returns nothing for it.
    #[must_use]
    pub fn without_stage(mut self, name: &str) -> Self {
        self.stages.remove(name);
        self
    }

    /// Sets the feedback prompter.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn FeedbackPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// A factory over the registered stages.
    #[must_use]
    pub fn registry(&self) -> StageRegistry {
        self.stages
            .iter()
            .fold(StageRegistry::new(), |registry, (name, stage)| {
                let stage = stage.clone();
                registry.with_stage(
                    name.clone(),
                    Box::new(move || Arc::new(stage.clone()) as Arc<dyn Stage>),
                )
            })
    }

    /// An orchestrator over the harness repository, stages, events and
    /// prompter.
    #[must_use]
    pub fn orchestrator(&self) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            self.repository.clone(),
            Arc::new(self.registry()),
            self.sequence.clone(),
        )
        .with_event_sink(self.events.clone())
        .with_prompter(self.prompter.clone())
    }
}
