//! In-memory repository.

use super::{PipelineRepository, TransactionHandle};
use crate::core::{Task, TaskStatus};
use crate::errors::{EntityKind, PipelineError, PipelineResult};
use crate::state::PipelineState;
use crate::utils::now_utc;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct Tables {
    tasks: HashMap<String, Task>,
    states: HashMap<String, PipelineState>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    // Open transactions, outermost first, each with the tables as they were
    // when it started.
    transactions: Vec<(TransactionHandle, Tables)>,
    next_transaction: u64,
}

/// Repository backed by in-process maps.
///
/// Transactions snapshot the maps when they start; aborting one restores
/// its snapshot and discards every transaction opened inside it.
#[derive(Debug, Default)]
pub struct InMemoryPipelineRepository {
    inner: Mutex<Inner>,
}

impl InMemoryPipelineRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pipeline states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.inner.lock().tables.states.len()
    }

    /// Number of open transactions.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.inner.lock().transactions.len()
    }

    fn position(inner: &Inner, handle: TransactionHandle) -> PipelineResult<usize> {
        inner
            .transactions
            .iter()
            .position(|(open, _)| *open == handle)
            .ok_or_else(|| {
                PipelineError::Transaction(format!("unknown or finished transaction {handle}"))
            })
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn get_task(&self, task_id: &str) -> PipelineResult<Option<Task>> {
        Ok(self.inner.lock().tables.tasks.get(task_id).cloned())
    }

    async fn save_task(&self, task: &Task) -> PipelineResult<()> {
        self.inner
            .lock()
            .tables
            .tasks
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_tasks(&self, status: Option<TaskStatus>) -> PipelineResult<Vec<Task>> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tables
            .tasks
            .values()
            .filter(|task| status.map_or(true, |s| task.status() == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn get_pipeline_state(&self, state_id: &str) -> PipelineResult<Option<PipelineState>> {
        Ok(self.inner.lock().tables.states.get(state_id).cloned())
    }

    async fn save_pipeline_state(&self, state: &PipelineState) -> PipelineResult<PipelineState> {
        let mut inner = self.inner.lock();

        if !inner.tables.tasks.contains_key(&state.task_id) {
            return Err(PipelineError::not_found(EntityKind::Task, state.task_id.as_str()));
        }
        if let Some(existing) = inner.tables.states.get(&state.id) {
            if existing.version != state.version {
                return Err(PipelineError::VersionConflict {
                    id: state.id.clone(),
                    expected: state.version,
                    found: existing.version,
                });
            }
        }

        let mut stored = state.clone();
        stored.version += 1;
        stored.updated_at = now_utc();
        inner.tables.states.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_latest_pipeline_state(
        &self,
        task_id: &str,
    ) -> PipelineResult<Option<PipelineState>> {
        let inner = self.inner.lock();
        Ok(inner
            .tables
            .states
            .values()
            .filter(|state| state.task_id == task_id)
            .max_by_key(|state| (state.updated_at, state.created_at))
            .cloned())
    }

    async fn start_transaction(&self) -> PipelineResult<TransactionHandle> {
        let mut inner = self.inner.lock();
        inner.next_transaction += 1;
        let handle = TransactionHandle::new(inner.next_transaction);
        let snapshot = inner.tables.clone();
        inner.transactions.push((handle, snapshot));
        Ok(handle)
    }

    async fn commit_transaction(&self, handle: TransactionHandle) -> PipelineResult<()> {
        let mut inner = self.inner.lock();
        let pos = Self::position(&inner, handle)?;
        inner.transactions.truncate(pos);
        Ok(())
    }

    async fn abort_transaction(&self, handle: TransactionHandle) -> PipelineResult<()> {
        let mut inner = self.inner.lock();
        let pos = Self::position(&inner, handle)?;
        let (_, snapshot) = inner.transactions.swap_remove(pos);
        inner.transactions.truncate(pos);
        inner.tables = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageSequence;
    use crate::repository::run_in_transaction;
    use pretty_assertions::assert_eq;

    async fn repo_with_task() -> (InMemoryPipelineRepository, Task) {
        let repo = InMemoryPipelineRepository::new();
        let task = Task::new("Build a parser", vec!["tokenize".to_string()]).unwrap();
        repo.save_task(&task).await.unwrap();
        (repo, task)
    }

    #[tokio::test]
    async fn test_missing_reads_return_none() {
        let repo = InMemoryPipelineRepository::new();
        assert!(repo.get_task("nope").await.unwrap().is_none());
        assert!(repo.get_pipeline_state("nope").await.unwrap().is_none());
        assert!(repo.get_latest_pipeline_state("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_bumps_version() {
        let (repo, task) = repo_with_task().await;
        let state = PipelineState::new(&task.id, &StageSequence::default()).unwrap();

        let stored = repo.save_pipeline_state(&state).await.unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.updated_at >= state.updated_at);

        let again = repo.save_pipeline_state(&stored).await.unwrap();
        assert_eq!(again.version, 2);
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let (repo, task) = repo_with_task().await;
        let state = PipelineState::new(&task.id, &StageSequence::default()).unwrap();
        let stored = repo.save_pipeline_state(&state).await.unwrap();

        let mut writer_a = stored.clone();
        let mut writer_b = stored;
        writer_a.current_stage = "knowledge_gathering".to_string();
        repo.save_pipeline_state(&writer_a).await.unwrap();

        writer_b.stages_completed.push("requirements_gathering".to_string());
        let err = repo.save_pipeline_state(&writer_b).await.unwrap_err();

        assert_eq!(err.code(), "VersionConflict");
        let persisted = repo.get_pipeline_state(&writer_b.id).await.unwrap().unwrap();
        assert_eq!(persisted.current_stage, "knowledge_gathering");
        assert!(persisted.stages_completed.is_empty());
    }

    #[tokio::test]
    async fn test_save_requires_known_task() {
        let repo = InMemoryPipelineRepository::new();
        let state = PipelineState::new("ghost", &StageSequence::default()).unwrap();

        let err = repo.save_pipeline_state(&state).await.unwrap_err();
        assert!(err.is_not_found_kind(EntityKind::Task));
    }

    #[tokio::test]
    async fn test_latest_state_is_most_recently_updated() {
        let (repo, task) = repo_with_task().await;
        let seq = StageSequence::default();
        let first = repo
            .save_pipeline_state(&PipelineState::new(&task.id, &seq).unwrap())
            .await
            .unwrap();
        let second = repo
            .save_pipeline_state(&PipelineState::new(&task.id, &seq).unwrap())
            .await
            .unwrap();

        let latest = repo.get_latest_pipeline_state(&task.id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        repo.save_pipeline_state(&first).await.unwrap();
        let latest = repo.get_latest_pipeline_state(&task.id).await.unwrap().unwrap();
        assert_eq!(latest.id, first.id);
    }

    #[tokio::test]
    async fn test_list_tasks_filters_by_status() {
        let (repo, mut task) = repo_with_task().await;
        let other = Task::new("Write docs", vec!["readme".to_string()]).unwrap();
        repo.save_task(&other).await.unwrap();

        task.transition_to(TaskStatus::InProgress).unwrap();
        repo.save_task(&task).await.unwrap();

        assert_eq!(repo.list_tasks(None).await.unwrap().len(), 2);
        let in_progress = repo.list_tasks(Some(TaskStatus::InProgress)).await.unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, task.id);
    }

    #[tokio::test]
    async fn test_abort_restores_snapshot() {
        let (repo, task) = repo_with_task().await;
        let state = PipelineState::new(&task.id, &StageSequence::default()).unwrap();

        let handle = repo.start_transaction().await.unwrap();
        repo.save_pipeline_state(&state).await.unwrap();
        assert_eq!(repo.state_count(), 1);

        repo.abort_transaction(handle).await.unwrap();
        assert_eq!(repo.state_count(), 0);
        assert_eq!(repo.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_commit_keeps_writes_and_closes_handle() {
        let (repo, task) = repo_with_task().await;
        let state = PipelineState::new(&task.id, &StageSequence::default()).unwrap();

        let handle = repo.start_transaction().await.unwrap();
        repo.save_pipeline_state(&state).await.unwrap();
        repo.commit_transaction(handle).await.unwrap();

        assert_eq!(repo.state_count(), 1);
        let err = repo.commit_transaction(handle).await.unwrap_err();
        assert_eq!(err.code(), "Transaction");
    }

    #[tokio::test]
    async fn test_aborting_outer_discards_committed_inner() {
        let (repo, task) = repo_with_task().await;
        let seq = StageSequence::default();

        let outer = repo.start_transaction().await.unwrap();
        let inner = repo.start_transaction().await.unwrap();
        repo.save_pipeline_state(&PipelineState::new(&task.id, &seq).unwrap())
            .await
            .unwrap();
        repo.commit_transaction(inner).await.unwrap();
        assert_eq!(repo.state_count(), 1);

        repo.abort_transaction(outer).await.unwrap();
        assert_eq!(repo.state_count(), 0);
    }

    #[tokio::test]
    async fn test_aborting_inner_keeps_outer_writes() {
        let (repo, task) = repo_with_task().await;
        let seq = StageSequence::default();

        let outer = repo.start_transaction().await.unwrap();
        repo.save_pipeline_state(&PipelineState::new(&task.id, &seq).unwrap())
            .await
            .unwrap();
        let inner = repo.start_transaction().await.unwrap();
        repo.save_pipeline_state(&PipelineState::new(&task.id, &seq).unwrap())
            .await
            .unwrap();

        repo.abort_transaction(inner).await.unwrap();
        assert_eq!(repo.state_count(), 1);
        repo.commit_transaction(outer).await.unwrap();
        assert_eq!(repo.state_count(), 1);
    }

    #[tokio::test]
    async fn test_run_in_transaction_commits_and_aborts() {
        let (repo, task) = repo_with_task().await;
        let seq = StageSequence::default();

        let saved = run_in_transaction(&repo, || async {
            repo.save_pipeline_state(&PipelineState::new(&task.id, &seq).unwrap())
                .await
        })
        .await
        .unwrap();
        assert_eq!(saved.version, 1);

        let result: PipelineResult<()> = run_in_transaction(&repo, || async {
            let saved = repo
                .save_pipeline_state(&PipelineState::new(&task.id, &seq).unwrap())
                .await;
            assert!(saved.is_ok());
            Err(PipelineError::Repository("disk full".to_string()))
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "Repository");
        assert_eq!(repo.state_count(), 1);
        assert_eq!(repo.open_transactions(), 0);
    }
}
