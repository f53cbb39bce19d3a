//! The yes/no pause offered after each non-terminal stage.

use crate::errors::{PipelineError, PipelineResult};
use crate::state::PipelineProgress;
use async_trait::async_trait;
use dialoguer::Confirm;
use tracing::warn;

/// Asks whether pending feedback should be incorporated before the
/// pipeline continues.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackPrompter: Send + Sync {
    /// Called after `completed_stage` finished. Returns true to incorporate.
    async fn confirm_incorporation(
        &self,
        completed_stage: &str,
        progress: &PipelineProgress,
    ) -> PipelineResult<bool>;
}

/// Terminal prompt. Blocks the pipeline until the user answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompter;

#[async_trait]
impl FeedbackPrompter for ConsolePrompter {
    async fn confirm_incorporation(
        &self,
        completed_stage: &str,
        progress: &PipelineProgress,
    ) -> PipelineResult<bool> {
        let prompt = format!(
            "Stage {completed_stage} completed ({:.0}% of pipeline). Incorporate feedback before continuing?",
            progress.percentage
        );

        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(prompt).default(false).interact()
        })
        .await
        .map_err(|e| PipelineError::Prompt(e.to_string()))?;

        match answer {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(stage = %completed_stage, error = %e, "Feedback prompt failed, continuing without feedback");
                Ok(false)
            }
        }
    }
}

/// Non-interactive prompter that always incorporates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysIncorporate;

#[async_trait]
impl FeedbackPrompter for AlwaysIncorporate {
    async fn confirm_incorporation(
        &self,
        _completed_stage: &str,
        _progress: &PipelineProgress,
    ) -> PipelineResult<bool> {
        Ok(true)
    }
}

/// Non-interactive prompter that never incorporates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverIncorporate;

#[async_trait]
impl FeedbackPrompter for NeverIncorporate {
    async fn confirm_incorporation(
        &self,
        _completed_stage: &str,
        _progress: &PipelineProgress,
    ) -> PipelineResult<bool> {
        Ok(false)
    }
}
