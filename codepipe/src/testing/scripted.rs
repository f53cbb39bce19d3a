//! A stage that plays back a script of results.

use crate::core::{StageSequence, Task};
use crate::stages::{Stage, StageError, StageResult};
use crate::state::PipelineState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One scripted reaction of a [`ScriptedStage`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Return a completed result with this output.
    Complete(HashMap<String, serde_json::Value>),
    /// Return a failed result with this error.
    Fail(String),
    /// Return a skipped result with this reason.
    Skip(String),
    /// Return a stage error.
    Error(String),
}

#[derive(Debug)]
struct Script {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Mutex<Option<ScriptStep>>,
    calls: AtomicUsize,
}

/// A stage that returns scripted results in order, then a fallback.
///
/// Clones share the script and the call counter, so a factory can hand out
/// a fresh clone per execution while the test keeps scripting the original.
/// Without a fallback the stage completes with `{"stage": name}`.
#[derive(Debug, Clone)]
pub struct ScriptedStage {
    name: String,
    previous: Option<String>,
    next: Option<String>,
    script: Arc<Script>,
}

impl ScriptedStage {
    /// Creates a stage positioned at `name` within `sequence`.
    #[must_use]
    pub fn new(name: impl Into<String>, sequence: &StageSequence) -> Self {
        let name = name.into();
        Self {
            previous: sequence.previous_of(&name).map(String::from),
            next: sequence.next_after(&name).map(String::from),
            name,
            script: Arc::new(Script {
                steps: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Overrides the declared successor.
    #[must_use]
    pub fn with_next(mut self, next: Option<&str>) -> Self {
        self.next = next.map(String::from);
        self
    }

    /// Queues a step.
    pub fn push(&self, step: ScriptStep) -> &Self {
        self.script.steps.lock().push_back(step);
        self
    }

    /// Sets the step used once the queue is empty.
    pub fn set_fallback(&self, step: ScriptStep) -> &Self {
        *self.script.fallback.lock() = Some(step);
        self
    }

    /// Number of times `execute` ran, across all clones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> ScriptStep {
        if let Some(step) = self.script.steps.lock().pop_front() {
            return step;
        }
        self.script.fallback.lock().clone().unwrap_or_else(|| {
            ScriptStep::Complete(HashMap::from([(
                "stage".to_string(),
                serde_json::json!(self.name),
            )]))
        })
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _task: &Task, _state: &PipelineState) -> Result<StageResult, StageError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            ScriptStep::Complete(output) => Ok(StageResult::completed(&self.name, output)),
            ScriptStep::Fail(error) => Ok(StageResult::failed(&self.name, error)),
            ScriptStep::Skip(reason) => Ok(StageResult::skipped(&self.name, reason)),
            ScriptStep::Error(message) => Err(StageError::new(&self.name, message)),
        }
    }

    fn validate_transition_from_name(&self, previous_stage: Option<&str>) -> bool {
        self.previous.as_deref() == previous_stage
    }

    fn next_stage_name(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
