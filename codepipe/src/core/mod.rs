//! Core domain model types for codepipe.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage, task and feedback status enums
//! - The fixed, ordered stage sequence
//! - The task entity processed by a pipeline

mod sequence;
mod status;
mod task;

pub use sequence::{StageSequence, DEFAULT_STAGES};
pub use status::{FeedbackType, StageStatus, TaskStatus};
pub use task::Task;
