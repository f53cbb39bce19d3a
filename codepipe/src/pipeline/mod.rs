//! Pipeline execution.
//!
//! This module provides:
//! - The single-stage executor with transition checks and checkpoints
//! - The orchestrator that drives a task through the stage sequence

mod executor;
mod orchestrator;


pub use executor::PipelineExecutor;
pub use orchestrator::{PipelineOrchestrator, PipelineRun, RunOutcome};
