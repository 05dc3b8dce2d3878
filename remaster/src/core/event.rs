//! Workflow events delivered to observers.

use super::{Stage, StageAction};
use crate::batch::BatchEvent;
use crate::image::ImageInfo;
use crate::process::{OutputChunk, RunOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event emitted by a pipeline.
///
/// The presentation layer subscribes to these instead of the core reaching
/// into widgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// The pipeline instance that emitted the event.
    pub run_id: Uuid,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// What happened.
    pub payload: EventPayload,
}

/// The body of a [`WorkflowEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The current stage changed.
    StageChanged {
        /// Stage left.
        from: Stage,
        /// Stage entered.
        to: Stage,
    },
    /// The stage busy sub-state changed.
    BusyChanged {
        /// Current stage.
        stage: Stage,
        /// Whether navigation is disabled.
        busy: bool,
    },
    /// A stage action started.
    ActionStarted {
        /// The action.
        action: StageAction,
    },
    /// A chunk of streamed tool output.
    Output {
        /// The action producing output.
        action: StageAction,
        /// The chunk.
        chunk: OutputChunk,
    },
    /// A progress update (0..=100).
    Progress {
        /// The action reporting progress.
        action: StageAction,
        /// Percentage.
        percent: u8,
    },
    /// A stage action finished successfully.
    ActionCompleted {
        /// The action.
        action: StageAction,
        /// Final outcome of its last command.
        outcome: RunOutcome,
    },
    /// A stage action failed; the pipeline stays on the current stage.
    ActionFailed {
        /// The action.
        action: StageAction,
        /// Final outcome of the failing command.
        outcome: RunOutcome,
    },
    /// A stage action was stopped by the caller.
    ActionCancelled {
        /// The action.
        action: StageAction,
    },
    /// Forwarded batch sequencer event.
    Batch {
        /// The batch event.
        event: BatchEvent,
    },
    /// Image metadata became available.
    ImageInspected {
        /// Parsed metadata.
        info: ImageInfo,
    },
    /// Package listings were refreshed.
    PackagesRefreshed {
        /// Number of installed packages.
        installed: usize,
        /// Number of available packages.
        available: usize,
    },
    /// A non-blocking warning.
    Warning {
        /// Message for the user.
        message: String,
    },
    /// The workflow completed.
    Finished {
        /// Whether the extracted working tree was removed.
        cleaned_up: bool,
    },
}

impl WorkflowEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(run_id: Uuid, payload: EventPayload) -> Self {
        Self {
            run_id,
            timestamp: crate::utils::iso_timestamp(),
            payload,
        }
    }

    /// Dotted event type name (e.g., "stage.changed").
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match &self.payload {
            EventPayload::StageChanged { .. } => "stage.changed",
            EventPayload::BusyChanged { .. } => "stage.busy_changed",
            EventPayload::ActionStarted { .. } => "action.started",
            EventPayload::Output { .. } => "action.output",
            EventPayload::Progress { .. } => "action.progress",
            EventPayload::ActionCompleted { .. } => "action.completed",
            EventPayload::ActionFailed { .. } => "action.failed",
            EventPayload::ActionCancelled { .. } => "action.cancelled",
            EventPayload::Batch { event } => event.event_type(),
            EventPayload::ImageInspected { .. } => "image.inspected",
            EventPayload::PackagesRefreshed { .. } => "packages.refreshed",
            EventPayload::Warning { .. } => "workflow.warning",
            EventPayload::Finished { .. } => "workflow.finished",
        }
    }
}
