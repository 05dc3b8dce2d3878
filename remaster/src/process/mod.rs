//! External command execution.
//!
//! This module provides:
//! - [`CommandSpec`], describing one command and how it is wrapped for a target root
//! - [`CommandRunner`], the seam the sequencer and pipeline launch commands through
//! - [`ProcessRunner`], the tokio implementation with streamed output and kill-on-cancel
//! - [`RunOutcome`], the terminal value every invocation produces

mod outcome;
mod runner;
mod spec;

pub use outcome::{LaunchError, OutputChunk, OutputSource, RunOutcome};
pub use runner::{CommandRunner, Completion, OutputStream, ProcessRunner, RunHandle, RunReporter};
pub use spec::{shell_quote, CommandSpec, RootWrapper};
