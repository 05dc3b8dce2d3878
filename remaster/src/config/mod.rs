//! Workflow configuration.
//!
//! Everything the pipeline needs besides package selections is plain data
//! loaded from JSON, with a default for every field.

mod tools;
mod workflow;

pub use tools::ToolPaths;
pub use workflow::{EmptySelectionPolicy, WorkflowConfig, DEFAULT_EXTRACT_DIR};
