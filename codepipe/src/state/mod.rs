//! Pipeline progress records and their lifecycle.
//!
//! [`PipelineState`] is a single mutable aggregate: mutators take `&mut self`
//! and the caller saves the result through the repository. The
//! [`StateManager`] wraps the load-mutate-save cycle for checkpoints,
//! rollback and progress reporting.

mod checkpoint;
mod feedback;
mod manager;
mod pipeline_state;

pub use checkpoint::{CheckpointSnapshot, CheckpointSummary};
pub use feedback::FeedbackItem;
pub use manager::{PipelineProgress, StateManager};
pub use pipeline_state::PipelineState;
