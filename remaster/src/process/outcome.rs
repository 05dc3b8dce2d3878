//! Output chunks and run outcomes.

use crate::errors::RemasterError;
use serde::{Deserialize, Serialize};

/// Which channel a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// One fragment of streamed process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Originating channel.
    pub source: OutputSource,
    /// Text, including its trailing newline when the tool wrote one.
    pub text: String,
}

impl OutputChunk {
    /// A chunk read from stdout.
    #[must_use]
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            source: OutputSource::Stdout,
            text: text.into(),
        }
    }

    /// A chunk read from stderr.
    #[must_use]
    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            source: OutputSource::Stderr,
            text: text.into(),
        }
    }
}

/// Why a command could not be launched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchError {
    /// The executable does not exist.
    NotFound,
    /// Any other spawn failure (permissions, bad working directory).
    Other,
}

/// The terminal result of one command invocation.
///
/// Owned by the invocation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    /// 0 on success, the tool's own code otherwise, -1 when it could not be launched.
    pub exit_code: i32,
    /// Everything read from stdout.
    pub aggregated_stdout: String,
    /// Everything read from stderr, plus launch diagnostics.
    pub aggregated_stderr: String,
    /// The caller stopped the command.
    pub was_cancelled: bool,
    /// Set when the command never started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_error: Option<LaunchError>,
}

impl RunOutcome {
    /// Exit code reported when the tool cannot be launched.
    pub const LAUNCH_FAILURE_CODE: i32 = -1;

    /// An outcome with the given exit code and no output.
    #[must_use]
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    /// The outcome for an executable that does not exist.
    #[must_use]
    pub fn not_found(program: &str, detail: &str) -> Self {
        Self {
            exit_code: Self::LAUNCH_FAILURE_CODE,
            aggregated_stderr: format!("Error: Command not found: {program}: {detail}\n"),
            launch_error: Some(LaunchError::NotFound),
            ..Self::default()
        }
    }

    /// The outcome for any other launch failure.
    #[must_use]
    pub fn launch_failed(program: &str, detail: &str) -> Self {
        Self {
            exit_code: Self::LAUNCH_FAILURE_CODE,
            aggregated_stderr: format!("Error executing command {program}: {detail}\n"),
            launch_error: Some(LaunchError::Other),
            ..Self::default()
        }
    }

    /// The outcome for a command stopped by the caller.
    #[must_use]
    pub fn cancelled(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            aggregated_stdout: stdout,
            aggregated_stderr: stderr,
            was_cancelled: true,
            launch_error: None,
        }
    }

    /// Sets the captured stdout.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.aggregated_stdout = stdout.into();
        self
    }

    /// Sets the captured stderr.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.aggregated_stderr = stderr.into();
        self
    }

    /// Returns true for exit code 0 without cancellation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.was_cancelled
    }

    /// Returns true if the executable was not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.launch_error == Some(LaunchError::NotFound)
    }

    /// Converts to a `Result`, classifying failures by the error taxonomy.
    pub fn into_result(self, program: &str) -> Result<Self, RemasterError> {
        if self.was_cancelled {
            return Err(RemasterError::Cancelled(format!("{program} was stopped")));
        }
        if self.is_not_found() {
            return Err(RemasterError::not_found(program));
        }
        if self.exit_code != 0 {
            return Err(RemasterError::process_failed(
                self.exit_code,
                self.aggregated_stderr,
            ));
        }
        Ok(self)
    }
}
