//! Testing utilities for remaster workflows.
//!
//! This module provides:
//! - A scripted [`CommandRunner`](crate::process::CommandRunner) that never spawns processes
//! - Assertions over collected workflow events
//! - Fixtures for an extracted working tree

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_event_order, assert_stage, event_types};
pub use fixtures::WorkspaceFixture;
pub use mocks::{ScriptedResponse, ScriptedRunner};
