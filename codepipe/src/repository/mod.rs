//! Persistence port for tasks and pipeline states.
//!
//! Reads that find nothing return `Ok(None)`; the managers turn that into
//! `NotFound` where existence is required.

mod memory;
mod transaction;

pub use memory::InMemoryPipelineRepository;
pub use transaction::{run_in_transaction, TransactionHandle};

use crate::core::{Task, TaskStatus};
use crate::errors::PipelineResult;
use crate::state::PipelineState;
use async_trait::async_trait;

/// Storage backend consumed by the engine.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Loads a task.
    async fn get_task(&self, task_id: &str) -> PipelineResult<Option<Task>>;

    /// Inserts or replaces a task.
    async fn save_task(&self, task: &Task) -> PipelineResult<()>;

    /// Lists tasks, optionally filtered by status.
    async fn list_tasks(&self, status: Option<TaskStatus>) -> PipelineResult<Vec<Task>>;

    /// Loads a pipeline state.
    async fn get_pipeline_state(&self, state_id: &str) -> PipelineResult<Option<PipelineState>>;

    /// Persists a pipeline state and returns the stored copy.
    ///
    /// The save succeeds only if the stored version equals `state.version`
    /// (or nothing is stored yet). The returned copy carries the bumped
    /// version and a refreshed `updated_at`.
    ///
    /// # Errors
    ///
    /// `VersionConflict` on a stale version, `NotFound` if the task is
    /// unknown.
    async fn save_pipeline_state(&self, state: &PipelineState) -> PipelineResult<PipelineState>;

    /// The most recently updated state for a task.
    async fn get_latest_pipeline_state(&self, task_id: &str)
        -> PipelineResult<Option<PipelineState>>;

    /// Opens a transaction.
    async fn start_transaction(&self) -> PipelineResult<TransactionHandle>;

    /// Makes the transaction's writes permanent.
    async fn commit_transaction(&self, handle: TransactionHandle) -> PipelineResult<()>;

    /// Discards the transaction's writes.
    async fn abort_transaction(&self, handle: TransactionHandle) -> PipelineResult<()>;
}
