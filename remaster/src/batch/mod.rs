//! Sequential execution of named commands.
//!
//! This module provides:
//! - Batch entries with a per-entry failure policy
//! - The sequencer that runs entries strictly one after another
//! - Batch events and the aggregate outcome

mod entry;
mod event;
mod sequencer;

pub use entry::{BatchEntry, BatchEntrySpec, FailurePolicy};
pub use event::{BatchEvent, BatchOutcome};
pub use sequencer::{BatchHandle, BatchSequencer};
