//! Transaction handles and the commit-or-abort wrapper.

use super::PipelineRepository;
use crate::errors::PipelineResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::{debug, error};

/// Opaque handle for an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHandle(u64);

impl TransactionHandle {
    /// Wraps a backend-specific transaction number.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The backend-specific transaction number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Runs `op` inside a transaction on `repo`.
///
/// Commits when `op` succeeds and aborts when it fails. A failed abort is
/// logged and the original error is returned.
///
/// # Errors
///
/// The error of `op`, or a start/commit failure.
pub async fn run_in_transaction<R, T, F, Fut>(repo: &R, op: F) -> PipelineResult<T>
where
    R: PipelineRepository + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let handle = repo.start_transaction().await?;
    debug!(transaction = %handle, "Transaction started");

    match op().await {
        Ok(value) => {
            repo.commit_transaction(handle).await?;
            debug!(transaction = %handle, "Transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = repo.abort_transaction(handle).await {
                error!(
                    transaction = %handle,
                    error = %abort_err,
                    "Failed to abort transaction"
                );
            } else {
                debug!(transaction = %handle, error = %err, "Transaction aborted");
            }
            Err(err)
        }
    }
}
