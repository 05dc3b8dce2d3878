//! Error types for the remaster workflow.
//!
//! Process failures never cross the output stream as errors; they arrive as a
//! [`RunOutcome`](crate::process::RunOutcome) and are only converted into a
//! [`RemasterError`] when a caller asks for a `Result`.

use crate::core::Stage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for remaster operations.
#[derive(Debug, Error)]
pub enum RemasterError {
    /// The command does not exist on the search path or inside the target root.
    #[error("Executable not found: {program}")]
    ExecutableNotFound {
        /// The program that could not be located.
        program: String,
    },

    /// A command exited with a non-zero status.
    #[error("Process failed with exit code {code}: {stderr}")]
    ProcessFailed {
        /// The exit code reported by the tool.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The operation was stopped by the caller.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A stage transition was refused because its precondition does not hold.
    #[error("{0}")]
    PreconditionNotMet(#[from] PreconditionError),

    /// A navigation or action request is not allowed in the current state.
    #[error("{0}")]
    NotAllowed(#[from] NotAllowedError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemasterError {
    /// Creates an executable-not-found error.
    #[must_use]
    pub fn not_found(program: impl Into<String>) -> Self {
        Self::ExecutableNotFound {
            program: program.into(),
        }
    }

    /// Creates a process-failed error.
    #[must_use]
    pub fn process_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            code,
            stderr: stderr.into(),
        }
    }
}

impl From<serde_json::Error> for RemasterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Raised when leaving a stage whose exit precondition does not hold.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Cannot leave stage '{stage}': {reason}")]
pub struct PreconditionError {
    /// The stage that could not be left.
    pub stage: Stage,
    /// Human-readable reason.
    pub reason: String,
}

impl PreconditionError {
    /// Creates a new precondition error.
    #[must_use]
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Raised when navigation or an action is refused.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Not allowed in stage '{stage}': {reason}")]
pub struct NotAllowedError {
    /// The current stage.
    pub stage: Stage,
    /// Human-readable reason.
    pub reason: String,
}

impl NotAllowedError {
    /// Creates a new not-allowed error.
    #[must_use]
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }

    /// The action of this stage is still running.
    #[must_use]
    pub fn busy(stage: Stage) -> Self {
        Self::new(stage, "an action is still running")
    }
}

/// Why a progress marker could not be turned into a percentage.
///
/// Never fatal; it only means there is no progress update for this chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    /// The chunk carries no marker for this tool.
    #[error("no progress marker found")]
    MarkerAbsent,

    /// A number in the marker does not parse.
    #[error("non-numeric progress value: {0}")]
    NotNumeric(String),

    /// The total in an `N of M` marker is zero.
    #[error("progress total is zero")]
    ZeroTotal,
}

/// Result type alias for remaster operations.
pub type Result<T, E = RemasterError> = std::result::Result<T, E>;
