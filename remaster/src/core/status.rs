//! Batch entry and package status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of one batch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Entry has not started.
    Pending,
    /// Entry is currently running.
    Running,
    /// Entry exited with code 0.
    Success,
    /// Entry exited non-zero, could not be launched, or was cancelled.
    Failed,
}

impl Default for EntryStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl EntryStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Per-package status while a removal is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// The removal command for this package is running.
    Removing,
    /// The package was removed.
    Removed,
    /// The removal failed.
    Error,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removing => write!(f, "removing"),
            Self::Removed => write!(f, "removed"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_status_display() {
        assert_eq!(EntryStatus::Pending.to_string(), "pending");
        assert_eq!(EntryStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_entry_status_is_terminal() {
        assert!(EntryStatus::Success.is_terminal());
        assert!(EntryStatus::Failed.is_terminal());
        assert!(!EntryStatus::Pending.is_terminal());
        assert!(!EntryStatus::Running.is_terminal());
    }

    #[test]
    fn test_package_status_serialize() {
        let json = serde_json::to_string(&PackageStatus::Removed).unwrap();
        assert_eq!(json, r#""removed""#);
    }
}
