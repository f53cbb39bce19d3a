//! Testing utilities for codepipe pipelines.
//!
//! This module provides:
//! - [`ScriptedStage`], a stage that plays back scripted results
//! - [`PipelineHarness`], an in-memory engine with a saved task

mod harness;
mod scripted;

pub use harness::PipelineHarness;
pub use scripted::{ScriptStep, ScriptedStage};
