//! Scripted command runner for testing.

use parking_lot::Mutex;
use std::time::Duration;

use crate::process::{CommandRunner, CommandSpec, OutputChunk, RunHandle, RunOutcome};

/// What a scripted command prints and how it ends.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    chunks: Vec<OutputChunk>,
    outcome: RunOutcome,
    hang: bool,
    delay: Option<Duration>,
}

impl ScriptedResponse {
    /// Exits 0 with no output.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Exits with `code`.
    #[must_use]
    pub fn exit(code: i32) -> Self {
        Self {
            outcome: RunOutcome::exited(code),
            ..Self::default()
        }
    }

    /// Reports the executable as missing.
    #[must_use]
    pub fn not_found(program: &str) -> Self {
        Self {
            outcome: RunOutcome::not_found(program, "No such file or directory"),
            ..Self::default()
        }
    }

    /// Adds stdout lines; each becomes one chunk and is aggregated.
    #[must_use]
    pub fn with_stdout_lines(mut self, lines: &[&str]) -> Self {
        for line in lines {
            let text = format!("{line}\n");
            self.outcome.aggregated_stdout.push_str(&text);
            self.chunks.push(OutputChunk::stdout(text));
        }
        self
    }

    /// Adds stderr lines.
    #[must_use]
    pub fn with_stderr_lines(mut self, lines: &[&str]) -> Self {
        for line in lines {
            let text = format!("{line}\n");
            self.outcome.aggregated_stderr.push_str(&text);
            self.chunks.push(OutputChunk::stderr(text));
        }
        self
    }

    /// Keeps running until stopped.
    #[must_use]
    pub fn hang_until_stopped(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Waits before finishing.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A runner that answers from a script instead of spawning processes.
///
/// Rules match when the space-joined argv contains their pattern; the first
/// matching rule wins. Unmatched commands succeed silently.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, ScriptedResponse)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Creates a runner with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule.
    #[must_use]
    pub fn on(self, pattern: impl Into<String>, response: ScriptedResponse) -> Self {
        self.rules.lock().push((pattern.into(), response));
        self
    }

    /// Every spec this runner was asked to run, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Joined argv of every call.
    #[must_use]
    pub fn call_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::joined).collect()
    }

    fn response_for(&self, spec: &CommandSpec) -> ScriptedResponse {
        let joined = spec.joined();
        self.rules
            .lock()
            .iter()
            .find(|(pattern, _)| joined.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> RunHandle {
        self.calls.lock().push(spec.clone());
        let response = self.response_for(spec);
        let (reporter, handle) = RunHandle::channel();

        tokio::spawn(async move {
            for chunk in response.chunks {
                if !reporter.send(chunk) {
                    break;
                }
            }
            if let Some(delay) = response.delay {
                let cancel = reporter.cancel_token();
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(delay) => {}
                }
            }
            if response.hang {
                reporter.cancel_token().cancelled().await;
            }

            let outcome = if reporter.is_cancelled() {
                RunOutcome::cancelled(
                    137,
                    response.outcome.aggregated_stdout,
                    response.outcome.aggregated_stderr,
                )
            } else {
                response.outcome
            };
            reporter.finish(outcome);
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_response_succeeds() {
        let runner = ScriptedRunner::new();
        let outcome = runner.run(&CommandSpec::program("anything")).wait().await;
        assert!(outcome.is_success());
        assert_eq!(runner.call_lines(), vec!["anything"]);
    }

    #[tokio::test]
    async fn test_rule_matching() {
        let runner = ScriptedRunner::new()
            .on("purge -y vim", ScriptedResponse::exit(100).with_stderr_lines(&["E: nope"]))
            .on("purge", ScriptedResponse::ok().with_stdout_lines(&["removed"]));

        let vim = runner.run(&CommandSpec::new(["apt-get", "purge", "-y", "vim"])).wait().await;
        assert_eq!(vim.exit_code, 100);
        assert_eq!(vim.aggregated_stderr, "E: nope\n");

        let nano = runner.run(&CommandSpec::new(["apt-get", "purge", "-y", "nano"])).wait().await;
        assert_eq!(nano.aggregated_stdout, "removed\n");
    }

    #[tokio::test]
    async fn test_hang_until_stopped() {
        let runner = ScriptedRunner::new().on("sleep", ScriptedResponse::ok().hang_until_stopped());
        let handle = runner.run(&CommandSpec::new(["sleep", "100"]));
        handle.stop();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .unwrap();
        assert!(outcome.was_cancelled);
    }
}
