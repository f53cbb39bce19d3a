//! Stage trait and implementations.
//!
//! Stages are the units of work in a codepipe pipeline. Each stage knows its
//! own predecessor and successor, so the order of the pipeline is encoded in
//! the stages as well as in the [`StageSequence`](crate::core::StageSequence).

mod factory;
mod result;
mod sequenced;

pub use factory::{StageConstructor, StageFactory, StageRegistry};
pub use result::{StageError, StageResult};
pub use sequenced::SequencedStage;

use crate::core::Task;
use crate::state::PipelineState;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// Implementations must only report their work through the returned
/// [`StageResult`]; progress bookkeeping (`current_stage`,
/// `stages_completed`) belongs to the executor.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage against a task and the current pipeline state.
    ///
    /// Returning `Err` aborts the executor call; returning a result with a
    /// non-completed status parks the pipeline on this stage.
    async fn execute(&self, task: &Task, state: &PipelineState) -> Result<StageResult, StageError>;

    /// Returns true if this stage may run after `previous_stage`.
    ///
    /// `None` means the pipeline has no completed stage yet; only the first
    /// stage accepts it. Every other stage accepts exactly one predecessor.
    fn validate_transition_from_name(&self, previous_stage: Option<&str>) -> bool;

    /// The stage that runs next, or `None` if this is the terminal stage.
    fn next_stage_name(&self) -> Option<&str>;
}
