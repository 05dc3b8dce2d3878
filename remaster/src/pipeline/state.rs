//! Pipeline state.

use crate::config::WorkflowConfig;
use crate::core::{Stage, StageAction};
use crate::image::ImageInfo;
use crate::packages::PackageSet;
use crate::process::RunOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the last run of an action ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionResult {
    /// The action succeeded.
    Succeeded,
    /// The action failed with this outcome.
    Failed {
        /// Outcome of the failing command.
        outcome: RunOutcome,
    },
    /// The caller stopped the action.
    Cancelled,
}

impl ActionResult {
    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Everything the pipeline knows about one workflow run.
///
/// Only the pipeline mutates this value; observers get clones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    /// Current stage.
    pub stage: Stage,
    /// Action in flight; navigation is disabled while set.
    pub busy: Option<StageAction>,
    /// Paths, options and tool locations.
    pub config: WorkflowConfig,
    /// Source image metadata, once inspected.
    pub image_info: Option<ImageInfo>,
    /// Packages installed in the target root; selection means removal.
    pub installed: PackageSet,
    /// Packages available to the target root; selection means installation.
    pub available: PackageSet,
    /// Last result of each action.
    pub results: HashMap<StageAction, ActionResult>,
    /// A customization batch ran to completion.
    pub customization_applied: bool,
    /// `finish` has run.
    pub finished: bool,
}

impl PipelineState {
    /// Creates the initial state.
    #[must_use]
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns true if an action is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    /// Last result of `action`, if it has run.
    #[must_use]
    pub fn result(&self, action: StageAction) -> Option<&ActionResult> {
        self.results.get(&action)
    }

    /// Returns true if `action` last succeeded.
    #[must_use]
    pub fn succeeded(&self, action: StageAction) -> bool {
        self.result(action).is_some_and(ActionResult::is_success)
    }

    /// Returns true if any package is selected for installation or removal.
    #[must_use]
    pub fn has_selection(&self) -> bool {
        self.installed.has_selection() || self.available.has_selection()
    }
}
