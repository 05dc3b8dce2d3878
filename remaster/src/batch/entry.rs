//! Batch entries.

use crate::core::EntryStatus;
use crate::process::{CommandSpec, RunOutcome};
use serde::{Deserialize, Serialize};

/// What the sequencer does when an entry fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure, warn, and run the next entry (default).
    #[default]
    Continue,
    /// Stop the batch; later entries depend on this one.
    Halt,
}

/// A named command to be run as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntrySpec {
    /// Label shown to the user.
    pub label: String,
    /// The command.
    pub command: CommandSpec,
    /// Failure handling for this entry.
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Package whose status follows this entry, for per-package removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl BatchEntrySpec {
    /// Creates an entry that continues on failure.
    #[must_use]
    pub fn new(label: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            label: label.into(),
            command,
            on_failure: FailurePolicy::Continue,
            package: None,
        }
    }

    /// Creates an entry whose failure aborts the rest of the batch.
    #[must_use]
    pub fn fatal(label: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            on_failure: FailurePolicy::Halt,
            ..Self::new(label, command)
        }
    }

    /// Ties the entry to a package record.
    #[must_use]
    pub fn for_package(mut self, name: impl Into<String>) -> Self {
        self.package = Some(name.into());
        self
    }
}

/// A batch entry together with its execution state.
///
/// Only the sequencer mutates `status` and `outcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Label shown to the user.
    pub label: String,
    /// The command.
    pub command: CommandSpec,
    /// Failure handling for this entry.
    pub on_failure: FailurePolicy,
    /// Package whose status follows this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Outcome once the entry has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    /// Execution status.
    pub status: EntryStatus,
}

impl From<BatchEntrySpec> for BatchEntry {
    fn from(spec: BatchEntrySpec) -> Self {
        Self {
            label: spec.label,
            command: spec.command,
            on_failure: spec.on_failure,
            package: spec.package,
            outcome: None,
            status: EntryStatus::Pending,
        }
    }
}

impl BatchEntry {
    /// Returns true if this entry halts the batch on failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.on_failure == FailurePolicy::Halt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec = BatchEntrySpec::new("Upgrade", CommandSpec::new(["apt-get", "upgrade", "-y"]));
        assert_eq!(spec.on_failure, FailurePolicy::Continue);
        assert!(spec.package.is_none());
    }

    #[test]
    fn test_fatal_entry() {
        let entry: BatchEntry =
            BatchEntrySpec::fatal("Bootstrap", CommandSpec::program("debootstrap")).into();
        assert!(entry.is_fatal());
        assert_eq!(entry.status, EntryStatus::Pending);
        assert!(entry.outcome.is_none());
    }

    #[test]
    fn test_for_package() {
        let spec = BatchEntrySpec::new("Remove vim", CommandSpec::program("apt-get")).for_package("vim");
        assert_eq!(spec.package.as_deref(), Some("vim"));
    }
}
