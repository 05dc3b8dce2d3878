//! Core domain model types for remaster.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The ordered workflow stages and the action bound to each
//! - Batch entry and package status enums
//! - The workflow event type delivered to observers

mod event;
mod stage;
mod status;

pub use event::{EventPayload, WorkflowEvent};
pub use stage::{Stage, StageAction};
pub use status::{EntryStatus, PackageStatus};
