//! Batch events and the aggregate outcome.

use super::BatchEntry;
use crate::core::EntryStatus;
use crate::process::{OutputChunk, RunOutcome};
use serde::{Deserialize, Serialize};

/// An event produced while a batch runs.
///
/// For every index, `EntryFinished` is delivered before the next
/// index's `EntryStarted`. `BatchFinished` is always last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// An entry started.
    EntryStarted {
        /// Entry index.
        index: usize,
        /// Entry label.
        label: String,
    },
    /// An entry produced output.
    EntryOutput {
        /// Entry index.
        index: usize,
        /// The chunk.
        chunk: OutputChunk,
    },
    /// An entry finished.
    EntryFinished {
        /// Entry index.
        index: usize,
        /// Final status.
        status: EntryStatus,
        /// Outcome of the command.
        outcome: RunOutcome,
    },
    /// An entry failed but the batch continues.
    EntryWarning {
        /// Entry index.
        index: usize,
        /// Message for the user.
        message: String,
    },
    /// Entries completed so far.
    Progress {
        /// Finished entries.
        completed: usize,
        /// All entries.
        total: usize,
    },
    /// The batch ended.
    BatchFinished {
        /// Aggregate outcome.
        outcome: BatchOutcome,
    },
}

impl BatchEvent {
    /// Dotted event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EntryStarted { .. } => "batch.entry_started",
            Self::EntryOutput { .. } => "batch.entry_output",
            Self::EntryFinished { .. } => "batch.entry_finished",
            Self::EntryWarning { .. } => "batch.entry_warning",
            Self::Progress { .. } => "batch.progress",
            Self::BatchFinished { .. } => "batch.finished",
        }
    }
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Every entry, in order, with its final status.
    pub entries: Vec<BatchEntry>,
    /// Index of the fatal entry that stopped the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<usize>,
    /// The caller stopped the batch.
    #[serde(default)]
    pub cancelled: bool,
}

impl BatchOutcome {
    /// Number of entries that ran to a terminal status.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_terminal()).count()
    }

    /// Indices of failed entries.
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == EntryStatus::Failed)
            .map(|(i, _)| i)
            .collect()
    }

    /// Returns true if every entry succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        !self.cancelled
            && self.halted_at.is_none()
            && self.entries.iter().all(|e| e.status == EntryStatus::Success)
    }

    /// Returns true if the batch was stopped before running every entry.
    #[must_use]
    pub fn is_terminal_failure(&self) -> bool {
        self.halted_at.is_some() || self.cancelled
    }

    /// The outcome of the last entry that ran.
    #[must_use]
    pub fn last_outcome(&self) -> Option<&RunOutcome> {
        self.entries.iter().rev().find_map(|e| e.outcome.as_ref())
    }

    /// Fraction of entries completed (0.0..=1.0).
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.entries.is_empty() {
            return 1.0;
        }
        self.completed() as f64 / self.entries.len() as f64
    }
}
