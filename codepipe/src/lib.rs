//! # Codepipe
//!
//! A checkpointed, feedback-aware stage pipeline engine for content
//! generation.
//!
//! A task moves through a fixed, ordered sequence of stages
//! (`requirements_gathering` through `review` by default). Codepipe provides:
//!
//! - **Stage execution**: transition-checked single stages with artifacts
//! - **Checkpoints**: named snapshots of progress with rollback
//! - **Feedback**: typed, prioritised human feedback per stage
//! - **Orchestration**: whole runs that park, stall or recover from checkpoints
//! - **Persistence**: a repository port with versioned saves and transactions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use codepipe::prelude::*;
//!
//! let repository = Arc::new(InMemoryPipelineRepository::new());
//! let task = Task::new("Implement a rate limiter", vec!["token bucket".into()])?;
//! repository.save_task(&task).await?;
//!
//! let orchestrator = PipelineOrchestrator::new(repository, Arc::new(stages), StageSequence::default());
//! let run = orchestrator
//!     .execute_pipeline(&task.id, &RunOptions::new().with_checkpoints(true))
//!     .await?;
//! assert!(run.is_completed());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod feedback;
pub mod observability;
pub mod pipeline;
pub mod repository;
pub mod stages;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, LoggingConfig, RunOptions};
    pub use crate::core::{FeedbackType, StageSequence, StageStatus, Task, TaskStatus};
    pub use crate::errors::{EntityKind, PipelineError, PipelineResult};
    pub use crate::events::{
        CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink,
        PipelineEvent,
    };
    pub use crate::feedback::{
        AlwaysIncorporate, ConsolePrompter, FeedbackManager, FeedbackPrompter, NeverIncorporate,
    };
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{PipelineExecutor, PipelineOrchestrator, PipelineRun, RunOutcome};
    pub use crate::repository::{InMemoryPipelineRepository, PipelineRepository};
    pub use crate::stages::{
        SequencedStage, Stage, StageError, StageFactory, StageRegistry, StageResult,
    };
    pub use crate::state::{PipelineProgress, PipelineState, StateManager};
    pub use std::sync::Arc;
}
