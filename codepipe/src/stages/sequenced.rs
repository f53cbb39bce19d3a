//! A closure-backed stage that takes its neighbours from a stage sequence.

use super::{Stage, StageError, StageResult};
use crate::core::{StageSequence, Task};
use crate::state::PipelineState;
use async_trait::async_trait;
use std::fmt::Debug;

/// A stage whose work is a plain function and whose predecessor and
/// successor are those of `name` in a [`StageSequence`].
pub struct SequencedStage<F>
where
    F: Fn(&Task, &PipelineState) -> Result<StageResult, StageError> + Send + Sync,
{
    name: String,
    previous: Option<String>,
    next: Option<String>,
    func: F,
}

impl<F> SequencedStage<F>
where
    F: Fn(&Task, &PipelineState) -> Result<StageResult, StageError> + Send + Sync,
{
    /// Creates a stage positioned at `name` within `sequence`.
    ///
    /// A name outside the sequence yields a stage with no predecessor and
    /// no successor.
    pub fn new(name: impl Into<String>, sequence: &StageSequence, func: F) -> Self {
        let name = name.into();
        Self {
            previous: sequence.previous_of(&name).map(String::from),
            next: sequence.next_after(&name).map(String::from),
            name,
            func,
        }
    }

    /// Overrides the declared successor.
    #[must_use]
    pub fn with_next(mut self, next: Option<&str>) -> Self {
        self.next = next.map(String::from);
        self
    }
}

impl<F> Debug for SequencedStage<F>
where
    F: Fn(&Task, &PipelineState) -> Result<StageResult, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencedStage")
            .field("name", &self.name)
            .field("previous", &self.previous)
            .field("next", &self.next)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for SequencedStage<F>
where
    F: Fn(&Task, &PipelineState) -> Result<StageResult, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, state: &PipelineState) -> Result<StageResult, StageError> {
        (self.func)(task, state)
    }

    fn validate_transition_from_name(&self, previous_stage: Option<&str>) -> bool {
        self.previous.as_deref() == previous_stage
    }

    fn next_stage_name(&self) -> Option<&str> {
        self.next.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn noop(name: &'static str) -> impl Fn(&Task, &PipelineState) -> Result<StageResult, StageError> {
        move |_, _| Ok(StageResult::completed(name, HashMap::new()))
    }

    #[test]
    fn test_first_stage_accepts_no_predecessor() {
        let seq = StageSequence::default();
        let stage = SequencedStage::new("requirements_gathering", &seq, noop("requirements_gathering"));

        assert!(stage.validate_transition_from_name(None));
        assert!(!stage.validate_transition_from_name(Some("review")));
        assert_eq!(stage.next_stage_name(), Some("knowledge_gathering"));
    }

    #[test]
    fn test_middle_stage_accepts_exactly_one_predecessor() {
        let seq = StageSequence::default();
        let stage = SequencedStage::new("implementation_planning", &seq, noop("implementation_planning"));

        assert!(stage.validate_transition_from_name(Some("knowledge_gathering")));
        assert!(!stage.validate_transition_from_name(Some("requirements_gathering")));
        assert!(!stage.validate_transition_from_name(None));
    }

    #[test]
    fn test_terminal_stage_has_no_successor() {
        let seq = StageSequence::default();
        let stage = SequencedStage::new("review", &seq, noop("review"));
        assert_eq!(stage.next_stage_name(), None);
    }

    #[tokio::test]
    async fn test_execute_calls_function() {
        let seq = StageSequence::default();
        let stage = SequencedStage::new("requirements_gathering", &seq, |task: &Task, _: &PipelineState| {
            Ok(StageResult::completed("requirements_gathering", HashMap::new())
                .with_output("requirements", serde_json::json!(task.requirements)))
        });

        let task = Task::new("desc", vec!["r1".to_string()]).unwrap();
        let state = PipelineState::new(&task.id, &seq).unwrap();
        let result = stage.execute(&task, &state).await.unwrap();

        assert_eq!(result.output["requirements"], serde_json::json!(["r1"]));
    }
}
