//! Runs batch entries strictly one after another.

use super::{BatchEntry, BatchEntrySpec, BatchEvent, BatchOutcome};
use crate::cancellation::CancellationToken;
use crate::core::EntryStatus;
use crate::errors::{RemasterError, Result};
use crate::process::CommandRunner;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Executes an ordered list of commands.
///
/// At most one entry runs at a time. A failed entry with
/// [`FailurePolicy::Continue`](super::FailurePolicy::Continue) is recorded and
/// the next entry starts; a failed [`FailurePolicy::Halt`](super::FailurePolicy::Halt)
/// entry ends the batch.
pub struct BatchSequencer {
    runner: Arc<dyn CommandRunner>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for BatchSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSequencer")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl BatchSequencer {
    /// Creates a sequencer over `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that stops this sequencer.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Stops the running entry and skips the rest.
    pub fn stop(&self) {
        self.cancel.cancel("batch stopped");
    }

    /// Runs `specs` in order, reporting every event to `on_event`.
    ///
    /// An empty list finishes immediately with an empty outcome.
    pub async fn run<F>(&self, specs: Vec<BatchEntrySpec>, mut on_event: F) -> BatchOutcome
    where
        F: FnMut(BatchEvent) + Send,
    {
        let mut outcome = BatchOutcome {
            entries: specs.into_iter().map(BatchEntry::from).collect(),
            halted_at: None,
            cancelled: false,
        };
        let total = outcome.entries.len();
        let mut completed = 0;

        for index in 0..total {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let entry = &mut outcome.entries[index];
            entry.status = EntryStatus::Running;
            info!(index, total, label = %entry.label, "Batch entry started");
            on_event(BatchEvent::EntryStarted {
                index,
                label: entry.label.clone(),
            });

            let mut handle = self.runner.run(&entry.command);
            let mut stop_sent = false;
            loop {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled(), if !stop_sent => {
                        handle.stop();
                        stop_sent = true;
                    }
                    chunk = handle.next_chunk() => match chunk {
                        Some(chunk) => on_event(BatchEvent::EntryOutput { index, chunk }),
                        None => break,
                    },
                }
            }
            let run = handle.wait().await;

            let succeeded = run.is_success();
            entry.status = if succeeded {
                EntryStatus::Success
            } else {
                EntryStatus::Failed
            };
            entry.outcome = Some(run.clone());
            completed += 1;
            on_event(BatchEvent::EntryFinished {
                index,
                status: entry.status,
                outcome: run.clone(),
            });
            on_event(BatchEvent::Progress { completed, total });

            if run.was_cancelled {
                outcome.cancelled = true;
                break;
            }
            if succeeded {
                continue;
            }
            if entry.is_fatal() {
                warn!(index, label = %entry.label, code = run.exit_code, "Fatal batch entry failed");
                outcome.halted_at = Some(index);
                break;
            }

            let message = format!(
                "{} failed with exit code {}; continuing",
                entry.label, run.exit_code
            );
            warn!(index, code = run.exit_code, "{}", message);
            on_event(BatchEvent::EntryWarning { index, message });
        }

        info!(
            completed,
            total,
            halted = outcome.halted_at.is_some(),
            cancelled = outcome.cancelled,
            "Batch finished"
        );
        on_event(BatchEvent::BatchFinished {
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Runs `specs` on a background task and returns a handle to its events.
    #[must_use]
    pub fn spawn(self, specs: Vec<BatchEntrySpec>) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.clone();
        let join = tokio::spawn(async move {
            self.run(specs, |event| {
                let _ = tx.send(event);
            })
            .await
        });
        BatchHandle { events: rx, join, cancel }
    }
}

/// Caller side of a spawned batch.
#[derive(Debug)]
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<BatchEvent>,
    join: JoinHandle<BatchOutcome>,
    cancel: Arc<CancellationToken>,
}

impl BatchHandle {
    /// Receives the next event, or `None` once the batch has finished.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Stops the batch.
    pub fn stop(&self) {
        self.cancel.cancel("batch stopped");
    }

    /// Waits for the aggregate outcome.
    pub async fn wait(self) -> Result<BatchOutcome> {
        self.join
            .await
            .map_err(|e| RemasterError::Cancelled(format!("batch task ended abnormally: {e}")))
    }
}
