//! Process runner with streamed output and cooperative cancellation.

use super::{CommandSpec, OutputChunk, OutputSource, RootWrapper, RunOutcome};
use crate::cancellation::CancellationToken;
use crate::utils::elapsed_ms;
use futures::Stream;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Launches commands.
///
/// `run` returns immediately; output and the final outcome arrive through the
/// returned [`RunHandle`].
pub trait CommandRunner: Send + Sync {
    /// Starts `spec` and returns a handle to its output and outcome.
    fn run(&self, spec: &CommandSpec) -> RunHandle;
}

/// Ordered stream of output chunks from one invocation.
///
/// Ends when the process closes both channels or is cancelled.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<OutputChunk>,
}

impl OutputStream {
    /// Receives the next chunk.
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        self.rx.recv().await
    }
}

impl Stream for OutputStream {
    type Item = OutputChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Future resolving to the final [`RunOutcome`].
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<RunOutcome>,
}

impl Future for Completion {
    type Output = RunOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                RunOutcome::launch_failed("runner", "task ended without reporting an outcome")
            })
        })
    }
}

/// Caller side of one invocation.
#[derive(Debug)]
pub struct RunHandle {
    output: OutputStream,
    completion: Completion,
    cancel: Arc<CancellationToken>,
}

impl RunHandle {
    /// Creates a connected reporter/handle pair.
    ///
    /// Runners keep the [`RunReporter`] and hand the handle to the caller.
    #[must_use]
    pub fn channel() -> (RunReporter, Self) {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let cancel = Arc::new(CancellationToken::new());

        let reporter = RunReporter {
            output: Some(output_tx),
            done: Some(done_tx),
            cancel: cancel.clone(),
        };
        let handle = Self {
            output: OutputStream { rx: output_rx },
            completion: Completion { rx: done_rx },
            cancel,
        };
        (reporter, handle)
    }

    /// Receives the next output chunk, or `None` once the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        self.output.next_chunk().await
    }

    /// Requests cancellation. Output stops and the process is killed.
    pub fn stop(&self) {
        self.cancel.cancel("stop requested");
    }

    /// The token observed by the runner.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Drains any remaining output and waits for the outcome.
    pub async fn wait(mut self) -> RunOutcome {
        while self.output.next_chunk().await.is_some() {}
        self.completion.await
    }

    /// Splits the handle into its stream, completion and cancel token.
    #[must_use]
    pub fn into_parts(self) -> (OutputStream, Completion, Arc<CancellationToken>) {
        (self.output, self.completion, self.cancel)
    }
}

/// Runner side of one invocation.
#[derive(Debug)]
pub struct RunReporter {
    output: Option<mpsc::UnboundedSender<OutputChunk>>,
    done: Option<oneshot::Sender<RunOutcome>>,
    cancel: Arc<CancellationToken>,
}

impl RunReporter {
    /// Forwards a chunk. Returns false once cancelled or the stream is closed.
    pub fn send(&self, chunk: OutputChunk) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.output
            .as_ref()
            .is_some_and(|tx| tx.send(chunk).is_ok())
    }

    /// Ends the output stream without reporting an outcome yet.
    pub fn close_output(&mut self) {
        self.output = None;
    }

    /// Returns true if the caller requested a stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The token the caller cancels.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Ends the stream and delivers the outcome.
    pub fn finish(mut self, outcome: RunOutcome) {
        self.output = None;
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

/// Runs commands as tokio child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    wrapper: RootWrapper,
    kill_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            wrapper: RootWrapper::default(),
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl ProcessRunner {
    /// Creates a runner using `wrapper` to enter target roots.
    #[must_use]
    pub fn new(wrapper: RootWrapper) -> Self {
        Self {
            wrapper,
            ..Self::default()
        }
    }

    /// Sets how long to wait for a killed process to be reaped.
    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// The wrapper used for target-root commands.
    #[must_use]
    pub fn wrapper(&self) -> &RootWrapper {
        &self.wrapper
    }
}

impl CommandRunner for ProcessRunner {
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    fn run(&self, spec: &CommandSpec) -> RunHandle {
        let argv = spec.build_argv(&self.wrapper);
        let working_directory = spec.working_directory.clone();
        let grace = self.kill_grace;
        let (reporter, handle) = RunHandle::channel();

        tokio::spawn(async move {
            let mut reporter = reporter;
            let outcome = execute(&argv, working_directory.as_deref(), &mut reporter, grace).await;
            reporter.finish(outcome);
        });

        handle
    }
}

async fn execute(
    argv: &[String],
    working_directory: Option<&Path>,
    reporter: &mut RunReporter,
    grace: Duration,
) -> RunOutcome {
    let Some((program, args)) = argv.split_first() else {
        return RunOutcome::launch_failed("", "empty argv");
    };

    if let Some(dir) = working_directory {
        if !dir.is_dir() {
            let detail = format!("working directory {} does not exist", dir.display());
            return report_launch_failure(reporter, RunOutcome::launch_failed(program, &detail));
        }
    }

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_directory {
        command.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(program = %program, "executable not found");
            return report_launch_failure(reporter, RunOutcome::not_found(program, &e.to_string()));
        }
        Err(e) => {
            warn!(program = %program, error = %e, "failed to spawn");
            return report_launch_failure(reporter, RunOutcome::launch_failed(program, &e.to_string()));
        }
    };
    debug!(program = %program, pid = ?child.id(), argv = ?argv, "spawned");

    // Both pipes feed one channel so chunks keep per-stream order.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(BufReader::new(stdout), OutputSource::Stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(BufReader::new(stderr), OutputSource::Stderr, line_tx.clone()));
    }
    drop(line_tx);

    let cancel = reporter.cancel_token();
    let mut stdout = String::new();
    let mut stderr = String::new();

    let cancelled = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break true,
            chunk = line_rx.recv() => match chunk {
                Some(chunk) => {
                    match chunk.source {
                        OutputSource::Stdout => stdout.push_str(&chunk.text),
                        OutputSource::Stderr => stderr.push_str(&chunk.text),
                    }
                    reporter.send(chunk);
                }
                None => break false,
            },
        }
    };

    let status = if cancelled {
        None
    } else {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        }
    };

    match status {
        Some(Ok(status)) => {
            let exit_code = exit_code(status);
            info!(
                program = %program,
                exit_code,
                duration_ms = elapsed_ms(start),
                "command finished"
            );
            RunOutcome::exited(exit_code)
                .with_stdout(stdout)
                .with_stderr(stderr)
        }
        Some(Err(e)) => {
            warn!(program = %program, error = %e, "failed to wait for process");
            RunOutcome::exited(RunOutcome::LAUNCH_FAILURE_CODE)
                .with_stdout(stdout)
                .with_stderr(format!("{stderr}Error waiting for {program}: {e}\n"))
        }
        None => {
            reporter.close_output();
            info!(program = %program, pid = ?child.id(), "cancelling command");
            let exit_code = terminate(&mut child, grace).await;
            for reader in readers {
                reader.abort();
            }
            RunOutcome::cancelled(exit_code, stdout, stderr)
        }
    }
}

fn report_launch_failure(reporter: &RunReporter, outcome: RunOutcome) -> RunOutcome {
    reporter.send(OutputChunk::stderr(outcome.aggregated_stderr.clone()));
    outcome
}

fn spawn_reader<R>(
    mut reader: R,
    source: OutputSource,
    tx: mpsc::UnboundedSender<OutputChunk>,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let chunk = OutputChunk {
                        source,
                        text: String::from_utf8_lossy(&buf).into_owned(),
                    };
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(?source, error = %e, "output read failed");
                    break;
                }
            }
        }
    })
}

/// Kills the child and waits a bounded time for it to be reaped.
async fn terminate(child: &mut Child, grace: Duration) -> i32 {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed, process may have exited");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => exit_code(status),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to reap cancelled process");
            RunOutcome::LAUNCH_FAILURE_CODE
        }
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "cancelled process did not exit in time");
            RunOutcome::LAUNCH_FAILURE_CODE
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(RunOutcome::LAUNCH_FAILURE_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(RunOutcome::LAUNCH_FAILURE_CODE)
}
