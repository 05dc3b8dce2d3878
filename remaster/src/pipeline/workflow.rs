//! The workflow state machine.

use super::actions::{run_action, ActionContext};
use super::{check_exit, ActionResult, PipelineState};
use crate::batch::BatchEntrySpec;
use crate::cancellation::CancellationToken;
use crate::config::{EmptySelectionPolicy, WorkflowConfig};
use crate::core::{EventPayload, Stage, StageAction, WorkflowEvent};
use crate::customize::{build_plan, CustomizationOptions, PlanInputs};
use crate::errors::{NotAllowedError, PreconditionError, RemasterError, Result};
use crate::events::EventSink;
use crate::image::{CompressionOptions, ImageInfo};
use crate::packages::PackageSet;
use crate::process::{CommandRunner, ProcessRunner, RunOutcome};
use crate::utils::generate_run_id;
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

struct Inner {
    run_id: Uuid,
    state: Arc<Mutex<PipelineState>>,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn EventSink>,
    busy_tx: watch::Sender<bool>,
    active: Mutex<Option<Arc<CancellationToken>>>,
}

/// Drives a remaster workflow through its stages.
///
/// Entering a stage that owns an action starts that action on a background
/// task and marks the pipeline busy; navigation is refused until the action
/// ends. Observers learn about every change through the [`EventSink`].
///
/// Navigation methods that start actions must be called from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct StagePipeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StagePipeline")
            .field("run_id", &self.inner.run_id)
            .field("stage", &state.stage)
            .field("busy", &state.busy)
            .finish_non_exhaustive()
    }
}

impl StagePipeline {
    /// Creates a pipeline at the first stage.
    #[must_use]
    pub fn new(config: WorkflowConfig, runner: Arc<dyn CommandRunner>, sink: Arc<dyn EventSink>) -> Self {
        let (busy_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                run_id: generate_run_id(),
                state: Arc::new(Mutex::new(PipelineState::new(config))),
                runner,
                sink,
                busy_tx,
                active: Mutex::new(None),
            }),
        }
    }

    /// Creates a pipeline that spawns real processes with the configured tools.
    #[must_use]
    pub fn with_process_runner(config: WorkflowConfig, sink: Arc<dyn EventSink>) -> Self {
        let runner = Arc::new(ProcessRunner::new(config.tools.wrapper()));
        Self::new(config, runner, sink)
    }

    /// The id stamped on every event of this pipeline.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// The current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.inner.state.lock().stage
    }

    /// Returns true while an action runs.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().is_busy()
    }

    /// A copy of the full state.
    #[must_use]
    pub fn snapshot(&self) -> PipelineState {
        self.inner.state.lock().clone()
    }

    /// Source image metadata, once inspected.
    #[must_use]
    pub fn image_info(&self) -> Option<ImageInfo> {
        self.inner.state.lock().image_info.clone()
    }

    /// Packages installed in the target root.
    #[must_use]
    pub fn installed(&self) -> PackageSet {
        self.inner.state.lock().installed.clone()
    }

    /// Packages available to the target root.
    #[must_use]
    pub fn available(&self) -> PackageSet {
        self.inner.state.lock().available.clone()
    }

    /// Watches the busy flag.
    #[must_use]
    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.inner.busy_tx.subscribe()
    }

    /// Completes once no action is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.busy_tx.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Sets the working folder.
    pub fn set_working_folder(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.edit_config(|c| c.working_folder = Some(path))
    }

    /// Sets the source image.
    pub fn set_source_image(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.edit_config(|c| c.source_image = Some(path))
    }

    /// Sets the output image.
    pub fn set_output_image(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.edit_config(|c| c.output_image = Some(path))
    }

    /// Sets or clears the preseed file.
    pub fn set_preseed(&self, path: Option<PathBuf>) -> Result<()> {
        self.edit_config(|c| c.preseed = path)
    }

    /// Sets or clears the boot logo.
    pub fn set_boot_logo(&self, path: Option<PathBuf>) -> Result<()> {
        self.edit_config(|c| c.boot_logo = path)
    }

    /// Sets or clears the compression options.
    pub fn set_compression(&self, compression: Option<CompressionOptions>) -> Result<()> {
        self.edit_config(|c| c.compression = compression)
    }

    /// Replaces the customization options.
    pub fn set_customization(&self, options: CustomizationOptions) -> Result<()> {
        self.edit_config(|c| c.customization = options)
    }

    /// Sets the empty selection policy.
    pub fn set_empty_selection_policy(&self, policy: EmptySelectionPolicy) -> Result<()> {
        self.edit_config(|c| c.empty_selection = policy)
    }

    /// Selects an installed package for removal. Returns false if unknown.
    pub fn select_for_removal(&self, name: &str, selected: bool) -> Result<bool> {
        let mut state = self.inner.state.lock();
        ensure_idle(&state)?;
        Ok(state.installed.select(name, selected))
    }

    /// Selects an available package for installation. Returns false if unknown.
    pub fn select_for_install(&self, name: &str, selected: bool) -> Result<bool> {
        let mut state = self.inner.state.lock();
        ensure_idle(&state)?;
        Ok(state.available.select(name, selected))
    }

    fn edit_config(&self, edit: impl FnOnce(&mut WorkflowConfig)) -> Result<()> {
        let mut state = self.inner.state.lock();
        ensure_idle(&state)?;
        edit(&mut state.config);
        Ok(())
    }

    /// Moves to the next stage.
    ///
    /// Fails with `PreconditionNotMet` when the current stage may not be
    /// left yet and with `NotAllowed` while busy or once finished; the stage
    /// is unchanged in both cases. Entering a stage with an action starts it.
    pub fn advance(&self) -> Result<Stage> {
        let (from, to, started) = {
            let mut state = self.inner.state.lock();
            ensure_idle(&state)?;
            let from = state.stage;
            let Some(to) = from.next() else {
                return Err(NotAllowedError::new(from, "the workflow is finished").into());
            };
            check_exit(&state)?;

            state.stage = to;
            let started = to.entry_action().map(|action| (action, self.begin(&mut state, action)));
            (from, to, started)
        };

        info!(run_id = %self.inner.run_id, %from, %to, "Stage advanced");
        self.emit(EventPayload::StageChanged { from, to });
        if let Some((action, token)) = started {
            self.launch(to, action, token);
        }
        Ok(to)
    }

    /// Moves to the previous stage.
    ///
    /// A no-op at the first stage. Refused while busy and once finished.
    /// Does not rerun the previous stage's action; see [`Self::retry`].
    pub fn retreat(&self) -> Result<Stage> {
        let (from, to) = {
            let mut state = self.inner.state.lock();
            ensure_idle(&state)?;
            let from = state.stage;
            if from.is_terminal() {
                return Err(NotAllowedError::new(from, "the workflow is finished").into());
            }
            let Some(to) = from.previous() else {
                return Ok(from);
            };
            state.stage = to;
            (from, to)
        };

        info!(run_id = %self.inner.run_id, %from, %to, "Stage retreated");
        self.emit(EventPayload::StageChanged { from, to });
        Ok(to)
    }

    /// Runs the current stage's action again.
    pub fn retry(&self) -> Result<StageAction> {
        let (stage, action, token) = {
            let mut state = self.inner.state.lock();
            ensure_idle(&state)?;
            let stage = state.stage;
            let Some(action) = stage.entry_action() else {
                return Err(NotAllowedError::new(stage, "this stage has no action to retry").into());
            };
            let token = self.begin(&mut state, action);
            (stage, action, token)
        };

        info!(run_id = %self.inner.run_id, %action, "Retrying stage action");
        self.launch(stage, action, token);
        Ok(action)
    }

    /// The customization batch that [`Self::apply_customization`] would run.
    #[must_use]
    pub fn plan_customization(&self) -> Vec<BatchEntrySpec> {
        let state = self.inner.state.lock();
        plan_for(&state)
    }

    /// Starts the customization batch.
    ///
    /// Returns false without starting anything when the plan is empty and
    /// the empty selection policy allows that.
    pub fn apply_customization(&self) -> Result<bool> {
        let (stage, token) = {
            let mut state = self.inner.state.lock();
            ensure_idle(&state)?;
            let stage = state.stage;
            if stage != Stage::Customization {
                return Err(NotAllowedError::new(stage, "customization can only be applied in the customization stage").into());
            }
            if plan_for(&state).is_empty() {
                match state.config.empty_selection {
                    EmptySelectionPolicy::Block => {
                        return Err(PreconditionError::new(stage, "No configuration changes selected").into());
                    }
                    EmptySelectionPolicy::AllowNoop => {
                        drop(state);
                        self.emit(EventPayload::Warning {
                            message: "No configuration changes selected".to_string(),
                        });
                        return Ok(false);
                    }
                }
            }
            (stage, self.begin(&mut state, StageAction::Customize))
        };

        self.launch(stage, StageAction::Customize, token);
        Ok(true)
    }

    /// Runs one command inside the extracted tree, streaming its output.
    ///
    /// Only allowed in the customization stage while idle. The command runs
    /// directly, without a shell, and its result is recorded under
    /// [`StageAction::RunCommand`].
    pub fn run_in_root(&self, argv: Vec<String>) -> Result<()> {
        if argv.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(RemasterError::Config("command is empty".to_string()));
        }
        let (stage, token) = {
            let mut state = self.inner.state.lock();
            ensure_idle(&state)?;
            let stage = state.stage;
            if stage != Stage::Customization {
                return Err(NotAllowedError::new(stage, "commands can only be run in the customization stage").into());
            }
            (stage, self.begin(&mut state, StageAction::RunCommand))
        };

        self.launch_with(stage, StageAction::RunCommand, token, Some(argv));
        Ok(())
    }

    /// Stops the running action. Returns false if nothing was running.
    pub fn cancel(&self) -> bool {
        let active = self.inner.active.lock().clone();
        match active {
            Some(token) => {
                info!(run_id = %self.inner.run_id, "Cancelling stage action");
                token.cancel("cancelled by caller");
                true
            }
            None => false,
        }
    }

    /// Ends the workflow, removing the extracted tree if configured.
    ///
    /// Only allowed in the final stage, and only once. Blocks while the tree
    /// is deleted. Returns whether the tree was removed. A tree that is not a
    /// direct child of the working folder is left in place with a warning.
    pub fn finish(&self) -> Result<bool> {
        let (root, removable, cleanup) = {
            let state = self.inner.state.lock();
            ensure_idle(&state)?;
            if state.stage != Stage::Finished {
                return Err(NotAllowedError::new(state.stage, "the workflow has not reached its final stage").into());
            }
            if state.finished {
                return Err(NotAllowedError::new(state.stage, "the workflow is already finished").into());
            }
            (
                state.config.extracted_root(),
                state.config.removable_extracted_root(),
                state.config.cleanup_on_finish,
            )
        };

        let mut cleaned_up = false;
        if let Some(root) = root.filter(|r| cleanup && r.exists()) {
            if removable.as_deref() == Some(root.as_path()) {
                fs::remove_dir_all(&root)?;
                info!(path = %root.display(), "Removed extracted tree");
                cleaned_up = true;
            } else {
                let message = format!(
                    "Not removing {}: it is not a folder directly inside the working folder",
                    root.display()
                );
                warn!(run_id = %self.inner.run_id, "{}", message);
                self.emit(EventPayload::Warning { message });
            }
        }

        self.inner.state.lock().finished = true;
        self.emit(EventPayload::Finished { cleaned_up });
        Ok(cleaned_up)
    }

    fn emit(&self, payload: EventPayload) {
        self.inner
            .sink
            .try_emit(&WorkflowEvent::new(self.inner.run_id, payload));
    }

    /// Marks `action` as running. Called with the state locked.
    fn begin(&self, state: &mut PipelineState, action: StageAction) -> Arc<CancellationToken> {
        state.busy = Some(action);
        state.results.remove(&action);
        let token = Arc::new(CancellationToken::new());
        *self.inner.active.lock() = Some(token.clone());
        self.inner.busy_tx.send_replace(true);
        token
    }

    /// Announces and spawns an action marked by [`Self::begin`].
    fn launch(&self, stage: Stage, action: StageAction, token: Arc<CancellationToken>) {
        self.launch_with(stage, action, token, None);
    }

    fn launch_with(
        &self,
        stage: Stage,
        action: StageAction,
        token: Arc<CancellationToken>,
        command: Option<Vec<String>>,
    ) {
        self.emit(EventPayload::BusyChanged { stage, busy: true });
        self.emit(EventPayload::ActionStarted { action });

        let pipeline = self.clone();
        tokio::spawn(async move {
            let ctx = ActionContext {
                run_id: pipeline.inner.run_id,
                sink: pipeline.inner.sink.clone(),
                runner: pipeline.inner.runner.clone(),
                state: pipeline.inner.state.clone(),
                cancel: token,
                command,
            };
            let outcome = run_action(&ctx, action).await;
            pipeline.complete(action, outcome);
        });
    }

    /// Records the result and returns to idle.
    ///
    /// The pipeline stays busy while the closing events are emitted. Idle is
    /// then published under the state lock, so no other action can begin
    /// between clearing `busy` and releasing the active token.
    fn complete(&self, action: StageAction, outcome: RunOutcome) {
        let result = if outcome.was_cancelled {
            ActionResult::Cancelled
        } else if outcome.is_success() {
            ActionResult::Succeeded
        } else {
            ActionResult::Failed {
                outcome: outcome.clone(),
            }
        };

        let stage = {
            let mut state = self.inner.state.lock();
            state.results.insert(action, result.clone());
            state.stage
        };

        match result {
            ActionResult::Succeeded => {
                info!(run_id = %self.inner.run_id, %action, "Stage action completed");
                self.emit(EventPayload::ActionCompleted { action, outcome });
            }
            ActionResult::Failed { .. } => {
                warn!(run_id = %self.inner.run_id, %action, code = outcome.exit_code, "Stage action failed");
                self.emit(EventPayload::ActionFailed { action, outcome });
            }
            ActionResult::Cancelled => {
                info!(run_id = %self.inner.run_id, %action, "Stage action cancelled");
                self.emit(EventPayload::ActionCancelled { action });
            }
        }
        self.emit(EventPayload::BusyChanged { stage, busy: false });

        let mut state = self.inner.state.lock();
        state.busy = None;
        *self.inner.active.lock() = None;
        self.inner.busy_tx.send_replace(false);
    }
}

fn ensure_idle(state: &PipelineState) -> std::result::Result<(), NotAllowedError> {
    if state.is_busy() {
        Err(NotAllowedError::busy(state.stage))
    } else {
        Ok(())
    }
}

fn plan_for(state: &PipelineState) -> Vec<BatchEntrySpec> {
    let Some(root) = state.config.extracted_root() else {
        return Vec::new();
    };
    build_plan(&PlanInputs {
        options: &state.config.customization,
        install: &state.available.selected_names(),
        remove: &state.installed.selected_names(),
        root: &root,
        tools: &state.config.tools,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchEvent;
    use crate::core::PackageStatus;
    use crate::events::CollectingEventSink;
    use crate::process::{CommandSpec, RunHandle};
    use crate::testing::{assert_event_order, assert_stage, ScriptedResponse, ScriptedRunner, WorkspaceFixture};
    use std::time::Duration;

    const INSTALLED: &str = "vim/jammy,now 2:8.2 amd64 [installed]";
    const AVAILABLE: &str = "htop/jammy 3.0.5 amd64";

    struct Harness {
        pipeline: StagePipeline,
        runner: Arc<ScriptedRunner>,
        sink: Arc<CollectingEventSink>,
        fixture: WorkspaceFixture,
        _dir: tempfile::TempDir,
    }

    fn harness(runner: ScriptedRunner, config: WorkflowConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let fixture = WorkspaceFixture {
            working_folder: dir.path().to_path_buf(),
            extracted: dir.path().join("extracted_iso"),
        };
        let image = fixture.write_image("ubuntu-22.04-amd64.iso").unwrap();
        let config = config
            .with_working_folder(dir.path())
            .with_source_image(image)
            .with_output_image(dir.path().join("out.iso"));

        let runner = Arc::new(runner);
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = StagePipeline::new(config, runner.clone(), sink.clone());
        Harness {
            pipeline,
            runner,
            sink,
            fixture,
            _dir: dir,
        }
    }

    fn happy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .on(
                "-report_system_area",
                ScriptedResponse::ok().with_stdout_lines(&["System_ID='Ubuntu'", "Application_ID='22.04'"]),
            )
            .on(
                "-osirrox",
                ScriptedResponse::ok().with_stdout_lines(&["10 of 40 files", "40 of 40 files"]),
            )
            .on("list --installed", ScriptedResponse::ok().with_stdout_lines(&[INSTALLED]))
            .on("apt list", ScriptedResponse::ok().with_stdout_lines(&["Listing... Done", AVAILABLE]))
            .on("mkisofs", ScriptedResponse::ok().with_stdout_lines(&["xorriso : UPDATE : 50%"]))
    }

    async fn advance_and_wait(pipeline: &StagePipeline) -> Stage {
        let stage = pipeline.advance().unwrap();
        tokio::time::timeout(Duration::from_secs(5), pipeline.wait_idle())
            .await
            .unwrap();
        stage
    }

    #[tokio::test]
    async fn test_advance_requires_working_folder() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = StagePipeline::new(
            WorkflowConfig::default(),
            Arc::new(ScriptedRunner::new()),
            sink.clone(),
        );

        let err = pipeline.advance().unwrap_err();
        assert!(matches!(err, RemasterError::PreconditionNotMet(_)));
        assert_stage(pipeline.stage(), Stage::WorkingFolderSelect);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_advance_moves_exactly_once() {
        let h = harness(happy_runner(), WorkflowConfig::default());

        let stage = advance_and_wait(&h.pipeline).await;
        assert_stage(stage, Stage::ImageInfo);
        assert_stage(h.pipeline.stage(), Stage::ImageInfo);
        assert_eq!(h.sink.events_of_type("stage.changed").len(), 1);

        let info = h.pipeline.image_info().unwrap();
        assert_eq!(info.name, "Ubuntu");
        assert_eq!(info.version, "22.04");
        assert_eq!(info.architecture, "amd64");
    }

    #[tokio::test]
    async fn test_retreat_at_first_stage_is_noop() {
        let h = harness(happy_runner(), WorkflowConfig::default());
        assert_eq!(h.pipeline.retreat().unwrap(), Stage::WorkingFolderSelect);
        assert_eq!(h.pipeline.retreat().unwrap(), Stage::WorkingFolderSelect);
        assert!(h.sink.is_empty());
    }

    #[tokio::test]
    async fn test_busy_blocks_navigation_until_cancelled() {
        let runner = ScriptedRunner::new().on("-report_system_area", ScriptedResponse::ok().hang_until_stopped());
        let h = harness(runner, WorkflowConfig::default());

        h.pipeline.advance().unwrap();
        assert!(h.pipeline.is_busy());
        assert!(matches!(h.pipeline.advance(), Err(RemasterError::NotAllowed(_))));
        assert!(matches!(h.pipeline.retreat(), Err(RemasterError::NotAllowed(_))));
        assert!(matches!(
            h.pipeline.set_output_image("/elsewhere.iso"),
            Err(RemasterError::NotAllowed(_))
        ));

        assert!(h.pipeline.cancel());
        tokio::time::timeout(Duration::from_secs(2), h.pipeline.wait_idle())
            .await
            .unwrap();

        assert!(!h.pipeline.is_busy());
        assert_eq!(
            h.pipeline.snapshot().result(StageAction::InspectImage),
            Some(&ActionResult::Cancelled)
        );
        assert_event_order(
            &h.sink.events(),
            &["stage.busy_changed", "action.started", "action.cancelled", "stage.busy_changed"],
        );
        assert_eq!(h.pipeline.retreat().unwrap(), Stage::WorkingFolderSelect);
        assert!(!h.pipeline.cancel());
    }

    #[tokio::test]
    async fn test_failed_extraction_stays_on_stage() {
        let runner = ScriptedRunner::new().on(
            "-osirrox",
            ScriptedResponse::exit(5).with_stderr_lines(&["libisoburn: FAILURE"]),
        );
        let h = harness(runner, WorkflowConfig::default());

        advance_and_wait(&h.pipeline).await;
        advance_and_wait(&h.pipeline).await;

        assert_stage(h.pipeline.stage(), Stage::Extraction);
        let failed = h.sink.events_of_type("action.failed");
        assert_eq!(failed.len(), 1);
        match &failed[0].payload {
            EventPayload::ActionFailed { action, outcome } => {
                assert_eq!(*action, StageAction::Extract);
                assert_eq!(outcome.exit_code, 5);
                assert!(outcome.aggregated_stderr.contains("FAILURE"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        assert!(matches!(h.pipeline.advance(), Err(RemasterError::PreconditionNotMet(_))));
        assert_eq!(h.pipeline.retreat().unwrap(), Stage::ImageInfo);
    }

    #[tokio::test]
    async fn test_extraction_reports_progress() {
        let h = harness(happy_runner(), WorkflowConfig::default());
        advance_and_wait(&h.pipeline).await;
        advance_and_wait(&h.pipeline).await;

        let percents: Vec<u8> = h
            .sink
            .events_of_type("action.progress")
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::Progress {
                    action: StageAction::Extract,
                    percent,
                } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![25, 100]);
        assert!(h.fixture.extracted.is_dir());
    }

    #[tokio::test]
    async fn test_full_workflow() {
        let h = harness(happy_runner(), WorkflowConfig::default());

        advance_and_wait(&h.pipeline).await;
        advance_and_wait(&h.pipeline).await;
        assert_stage(advance_and_wait(&h.pipeline).await, Stage::Customization);

        assert_eq!(h.pipeline.installed().len(), 1);
        assert_eq!(h.pipeline.available().len(), 1);
        assert!(h.pipeline.select_for_removal("vim", true).unwrap());
        assert!(h.pipeline.select_for_install("htop", true).unwrap());
        assert!(!h.pipeline.select_for_removal("emacs", true).unwrap());

        let labels: Vec<_> = h
            .pipeline
            .plan_customization()
            .into_iter()
            .map(|e| e.label)
            .collect();
        assert_eq!(labels, vec!["Install Applications", "Remove vim"]);

        assert!(h.pipeline.apply_customization().unwrap());
        tokio::time::timeout(Duration::from_secs(5), h.pipeline.wait_idle())
            .await
            .unwrap();
        assert_eq!(
            h.pipeline.installed().get("vim").unwrap().status,
            Some(PackageStatus::Removed)
        );
        assert!(h.pipeline.snapshot().customization_applied);

        assert_stage(advance_and_wait(&h.pipeline).await, Stage::Repackaging);
        let repack = h
            .runner
            .calls()
            .into_iter()
            .find(|c| c.argv.contains(&"mkisofs".to_string()))
            .unwrap();
        assert_eq!(
            repack.argv.last().map(PathBuf::from),
            Some(h.fixture.extracted.clone())
        );

        assert_stage(h.pipeline.advance().unwrap(), Stage::Finished);
        assert!(matches!(h.pipeline.retreat(), Err(RemasterError::NotAllowed(_))));
        assert!(h.pipeline.finish().unwrap());
        assert!(!h.fixture.extracted.exists());
        assert!(h.pipeline.finish().is_err());

        assert_event_order(
            &h.sink.events(),
            &[
                "image.inspected",
                "action.completed",
                "packages.refreshed",
                "batch.entry_started",
                "batch.entry_finished",
                "batch.finished",
                "workflow.finished",
            ],
        );
    }

    #[tokio::test]
    async fn test_invalid_extract_dir_blocks_advance() {
        let mut config = WorkflowConfig::default();
        config.extract_dir = "../victim".to_string();
        let h = harness(happy_runner(), config);

        assert!(matches!(h.pipeline.advance(), Err(RemasterError::PreconditionNotMet(_))));
        assert_stage(h.pipeline.stage(), Stage::WorkingFolderSelect);
        assert!(h.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_finish_keeps_tree_outside_working_folder() {
        let h = harness(happy_runner(), WorkflowConfig::default());
        for _ in 0..4 {
            advance_and_wait(&h.pipeline).await;
        }
        assert_stage(h.pipeline.advance().unwrap(), Stage::Finished);
        assert!(h.fixture.extracted.is_dir());

        // Points the extracted root at a sibling of the working folder.
        let nested = h.fixture.working_folder.join("work");
        std::fs::create_dir(&nested).unwrap();
        {
            let mut state = h.pipeline.inner.state.lock();
            state.config.working_folder = Some(nested);
            state.config.extract_dir = "../extracted_iso".to_string();
        }

        assert!(!h.pipeline.finish().unwrap());
        assert!(h.fixture.extracted.is_dir());
        assert_eq!(h.sink.events_of_type("workflow.warning").len(), 1);
        assert!(h.sink.events_of_type("workflow.finished").iter().any(|e| matches!(
            e.payload,
            EventPayload::Finished { cleaned_up: false }
        )));
    }

    #[tokio::test]
    async fn test_batch_events_are_forwarded_in_order() {
        let runner = happy_runner().on("purge", ScriptedResponse::exit(100));
        let h = harness(runner, WorkflowConfig::default());
        for _ in 0..3 {
            advance_and_wait(&h.pipeline).await;
        }
        h.pipeline.select_for_removal("vim", true).unwrap();
        h.pipeline
            .set_customization(CustomizationOptions::new().with_upgrade())
            .unwrap();

        h.pipeline.apply_customization().unwrap();
        h.pipeline.wait_idle().await;

        let finished: Vec<usize> = h
            .sink
            .events()
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::Batch {
                    event: BatchEvent::EntryFinished { index, .. },
                } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![0, 1]);
        assert_eq!(
            h.pipeline.installed().get("vim").unwrap().status,
            Some(PackageStatus::Error)
        );
        assert!(!h.sink.events_of_type("workflow.warning").is_empty());
        assert_eq!(
            h.pipeline.snapshot().result(StageAction::Customize),
            Some(&ActionResult::Succeeded)
        );
    }

    #[tokio::test]
    async fn test_empty_customization_policy() {
        let h = harness(happy_runner(), WorkflowConfig::default());
        for _ in 0..3 {
            advance_and_wait(&h.pipeline).await;
        }

        assert!(!h.pipeline.apply_customization().unwrap());
        assert_eq!(h.sink.events_of_type("workflow.warning").len(), 1);

        h.pipeline
            .set_empty_selection_policy(EmptySelectionPolicy::Block)
            .unwrap();
        assert!(matches!(
            h.pipeline.apply_customization(),
            Err(RemasterError::PreconditionNotMet(_))
        ));
        assert!(matches!(h.pipeline.advance(), Err(RemasterError::PreconditionNotMet(_))));
    }

    #[tokio::test]
    async fn test_retry_reruns_action() {
        let h = harness(happy_runner(), WorkflowConfig::default());
        advance_and_wait(&h.pipeline).await;

        assert_eq!(h.pipeline.retry().unwrap(), StageAction::InspectImage);
        h.pipeline.wait_idle().await;

        let inspections = h
            .runner
            .call_lines()
            .iter()
            .filter(|l| l.contains("-report_system_area"))
            .count();
        assert_eq!(inspections, 2);

        h.pipeline.retreat().unwrap();
        assert!(matches!(h.pipeline.retry(), Err(RemasterError::NotAllowed(_))));
    }

    #[tokio::test]
    async fn test_boot_logo_failure_is_a_warning() {
        let h = harness(happy_runner(), WorkflowConfig::default());
        for _ in 0..3 {
            advance_and_wait(&h.pipeline).await;
        }
        let logo = h.fixture.write_file("logo.png", "png").unwrap();
        // A file where the isolinux directory should be makes the copy fail.
        std::fs::write(h.fixture.extracted.join("isolinux"), "not a dir").unwrap();
        h.pipeline.set_boot_logo(Some(logo)).unwrap();

        advance_and_wait(&h.pipeline).await;
        assert!(h.pipeline.snapshot().succeeded(StageAction::Repackage));
        let warnings = h.sink.events_of_type("workflow.warning");
        assert!(warnings.iter().any(|e| matches!(
            &e.payload,
            EventPayload::Warning { message } if message.starts_with("Failed to copy boot logo")
        )));
    }

    #[tokio::test]
    async fn test_run_in_root_streams_output() {
        let runner = happy_runner().on(
            "uname -r",
            ScriptedResponse::ok().with_stdout_lines(&["5.15.0-91-generic"]),
        );
        let h = harness(runner, WorkflowConfig::default());
        let uname = || vec!["uname".to_string(), "-r".to_string()];

        assert!(matches!(h.pipeline.run_in_root(uname()), Err(RemasterError::NotAllowed(_))));
        for _ in 0..3 {
            advance_and_wait(&h.pipeline).await;
        }
        assert!(matches!(h.pipeline.run_in_root(Vec::new()), Err(RemasterError::Config(_))));

        h.pipeline.run_in_root(uname()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), h.pipeline.wait_idle())
            .await
            .unwrap();

        let call = h.runner.calls().pop().unwrap();
        assert_eq!(call.argv, uname());
        assert_eq!(call.target_root, Some(h.fixture.extracted.clone()));
        assert!(!call.shell_wrap);

        let output: String = h
            .sink
            .events_of_type("action.output")
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::Output {
                    action: StageAction::RunCommand,
                    chunk,
                } => Some(chunk.text.clone()),
                _ => None,
            })
            .collect();
        assert!(output.contains("5.15.0-91-generic"));
        assert_eq!(
            h.pipeline.snapshot().result(StageAction::RunCommand),
            Some(&ActionResult::Succeeded)
        );
        assert_stage(h.pipeline.stage(), Stage::Customization);
    }

    #[tokio::test]
    async fn test_run_in_root_refused_while_busy() {
        let runner = happy_runner().on("sleep", ScriptedResponse::ok().hang_until_stopped());
        let h = harness(runner, WorkflowConfig::default());
        for _ in 0..3 {
            advance_and_wait(&h.pipeline).await;
        }

        h.pipeline
            .run_in_root(vec!["sleep".to_string(), "600".to_string()])
            .unwrap();
        assert!(matches!(
            h.pipeline.run_in_root(vec!["true".to_string()]),
            Err(RemasterError::NotAllowed(_))
        ));
        assert!(matches!(h.pipeline.advance(), Err(RemasterError::NotAllowed(_))));

        assert!(h.pipeline.cancel());
        tokio::time::timeout(Duration::from_secs(2), h.pipeline.wait_idle())
            .await
            .unwrap();
        assert_eq!(
            h.pipeline.snapshot().result(StageAction::RunCommand),
            Some(&ActionResult::Cancelled)
        );
    }

    /// Retries the running stage's action from inside the completion event.
    #[derive(Default)]
    struct RetryOnCompleteSink {
        pipeline: parking_lot::Mutex<Option<StagePipeline>>,
        refused: parking_lot::Mutex<Vec<bool>>,
    }

    #[async_trait::async_trait]
    impl EventSink for RetryOnCompleteSink {
        async fn emit(&self, event: &WorkflowEvent) {
            self.try_emit(event);
        }

        fn try_emit(&self, event: &WorkflowEvent) {
            if !matches!(event.payload, EventPayload::ActionCompleted { .. }) {
                return;
            }
            let pipeline = self.pipeline.lock().clone();
            if let Some(pipeline) = pipeline {
                let refused = matches!(pipeline.retry(), Err(RemasterError::NotAllowed(_)));
                self.refused.lock().push(refused);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_action_begins_before_previous_one_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("ubuntu.iso");
        std::fs::write(&image, b"iso").unwrap();
        let config = WorkflowConfig::default()
            .with_working_folder(dir.path())
            .with_source_image(&image);
        let sink = Arc::new(RetryOnCompleteSink::default());
        let pipeline = StagePipeline::new(config, Arc::new(happy_runner()), sink.clone());
        *sink.pipeline.lock() = Some(pipeline.clone());

        for _ in 0..10 {
            if pipeline.stage() == Stage::WorkingFolderSelect {
                advance_and_wait(&pipeline).await;
            } else {
                pipeline.retry().unwrap();
                tokio::time::timeout(Duration::from_secs(5), pipeline.wait_idle())
                    .await
                    .unwrap();
            }
            assert!(!pipeline.is_busy());
            assert!(!*pipeline.subscribe_busy().borrow());
            assert!(!pipeline.cancel());
        }

        let refused = sink.refused.lock().clone();
        assert_eq!(refused, vec![true; 10]);
        sink.pipeline.lock().take();
    }

    mockall::mock! {
        Runner {}
        impl CommandRunner for Runner {
            fn run(&self, spec: &CommandSpec) -> RunHandle;
        }
    }

    #[tokio::test]
    async fn test_missing_inspection_tool_is_not_fatal() {
        let mut mock = MockRunner::new();
        mock.expect_run()
            .withf(|spec: &CommandSpec| spec.program_name() == "xorriso")
            .times(1)
            .returning(|spec| {
                let (reporter, handle) = RunHandle::channel();
                reporter.finish(RunOutcome::not_found(spec.program_name(), "No such file or directory"));
                handle
            });

        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("plain.iso");
        std::fs::write(&image, b"iso").unwrap();
        let sink = Arc::new(CollectingEventSink::new());
        let config = WorkflowConfig::default()
            .with_working_folder(dir.path())
            .with_source_image(&image);
        let pipeline = StagePipeline::new(config, Arc::new(mock), sink.clone());

        advance_and_wait(&pipeline).await;
        assert!(pipeline.image_info().is_none());
        assert_eq!(sink.events_of_type("workflow.warning").len(), 1);
        assert_eq!(sink.events_of_type("action.failed").len(), 1);
        assert!(!pipeline.is_busy());
    }
}
