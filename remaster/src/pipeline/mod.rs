//! The stage pipeline.
//!
//! This module provides:
//! - [`StagePipeline`]: the workflow state machine and its navigation
//! - [`PipelineState`]: the explicit state value the pipeline owns
//! - Exit preconditions for each stage
//! - The asynchronous stage actions

mod actions;
mod preconditions;
mod state;
mod workflow;

pub use preconditions::check_exit;
pub use state::{ActionResult, PipelineState};
pub use workflow::StagePipeline;
