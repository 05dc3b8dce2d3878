//! Stage actions.
//!
//! Each action runs on its own task while the pipeline is busy and returns
//! the outcome that decides how it ended. Only one action runs at a time.

use super::PipelineState;
use crate::batch::{BatchEvent, BatchSequencer};
use crate::cancellation::CancellationToken;
use crate::core::{EntryStatus, EventPayload, StageAction, WorkflowEvent};
use crate::customize::{build_plan, PlanInputs};
use crate::events::EventSink;
use crate::image::{create_command, extract_command, inspect_command, install_boot_logo, parse_report};
use crate::packages::{listing_command, parse_listing, ListingKind};
use crate::process::{CommandRunner, CommandSpec, RunOutcome};
use crate::progress::{parse_progress, ToolKind};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything an action needs from the pipeline.
pub(super) struct ActionContext {
    pub run_id: Uuid,
    pub sink: Arc<dyn EventSink>,
    pub runner: Arc<dyn CommandRunner>,
    pub state: Arc<Mutex<PipelineState>>,
    pub cancel: Arc<CancellationToken>,
    /// The user command for [`StageAction::RunCommand`].
    pub command: Option<Vec<String>>,
}

impl ActionContext {
    pub fn emit(&self, payload: EventPayload) {
        self.sink.try_emit(&WorkflowEvent::new(self.run_id, payload));
    }

    fn warn(&self, message: String) {
        warn!(run_id = %self.run_id, "{}", message);
        self.emit(EventPayload::Warning { message });
    }

    /// Runs one command, forwarding output and progress until it ends or the
    /// action is cancelled.
    async fn run_streamed(
        &self,
        action: StageAction,
        spec: &CommandSpec,
        progress: Option<ToolKind>,
        forward_output: bool,
    ) -> RunOutcome {
        let mut handle = self.runner.run(spec);
        let mut stop_sent = false;
        let mut last_percent = None;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled(), if !stop_sent => {
                    handle.stop();
                    stop_sent = true;
                }
                chunk = handle.next_chunk() => {
                    let Some(chunk) = chunk else { break };
                    if let Some(kind) = progress {
                        if let Some(percent) = parse_progress(kind, &chunk.text) {
                            if last_percent != Some(percent) {
                                last_percent = Some(percent);
                                self.emit(EventPayload::Progress { action, percent });
                            }
                        }
                    }
                    if forward_output {
                        self.emit(EventPayload::Output { action, chunk });
                    }
                }
            }
        }

        let outcome = handle.wait().await;
        if outcome.is_success() && progress.is_some() && last_percent != Some(100) {
            self.emit(EventPayload::Progress { action, percent: 100 });
        }
        outcome
    }
}

/// Runs `action` to completion.
pub(super) async fn run_action(ctx: &ActionContext, action: StageAction) -> RunOutcome {
    match action {
        StageAction::InspectImage => inspect(ctx).await,
        StageAction::Extract => extract(ctx).await,
        StageAction::ListPackages => list_packages(ctx).await,
        StageAction::Customize => customize(ctx).await,
        StageAction::Repackage => repackage(ctx).await,
        StageAction::RunCommand => run_command(ctx).await,
    }
}

fn missing(what: &str) -> RunOutcome {
    RunOutcome::launch_failed("remaster", &format!("{what} is not set"))
}

async fn inspect(ctx: &ActionContext) -> RunOutcome {
    let (xorriso, image) = {
        let state = ctx.state.lock();
        (state.config.tools.xorriso.clone(), state.config.source_image.clone())
    };
    let Some(image) = image else {
        return missing("source image");
    };

    let spec = inspect_command(&xorriso, &image);
    let outcome = ctx.run_streamed(StageAction::InspectImage, &spec, None, true).await;
    if outcome.is_success() {
        let info = parse_report(&outcome.aggregated_stdout, &image);
        info!(name = %info.name, version = %info.version, arch = %info.architecture, "Image inspected");
        ctx.state.lock().image_info = Some(info.clone());
        ctx.emit(EventPayload::ImageInspected { info });
    } else if !outcome.was_cancelled {
        ctx.warn(format!(
            "Could not read image information (exit code {}): {}",
            outcome.exit_code,
            outcome.aggregated_stderr.trim()
        ));
    }
    outcome
}

async fn extract(ctx: &ActionContext) -> RunOutcome {
    let (xorriso, image, root) = {
        let state = ctx.state.lock();
        (
            state.config.tools.xorriso.clone(),
            state.config.source_image.clone(),
            state.config.extracted_root(),
        )
    };
    let (Some(image), Some(root)) = (image, root) else {
        return missing("source image or working folder");
    };

    if let Err(e) = tokio::fs::create_dir_all(&root).await {
        return RunOutcome::launch_failed(&xorriso, &format!("cannot create {}: {e}", root.display()));
    }

    let spec = extract_command(&xorriso, &image, &root);
    ctx.run_streamed(StageAction::Extract, &spec, Some(ToolKind::Extraction), true)
        .await
}

async fn list_packages(ctx: &ActionContext) -> RunOutcome {
    let (apt, root) = {
        let state = ctx.state.lock();
        (state.config.tools.apt.clone(), state.config.extracted_root())
    };
    let Some(root) = root else {
        return missing("working folder");
    };

    let installed_spec = listing_command(ListingKind::Installed, &apt, &root);
    let installed = ctx
        .run_streamed(StageAction::ListPackages, &installed_spec, None, false)
        .await;
    if !installed.is_success() {
        if !installed.was_cancelled {
            ctx.warn(format!("Could not list installed packages (exit code {})", installed.exit_code));
        }
        return installed;
    }

    let available_spec = listing_command(ListingKind::Available, &apt, &root);
    let available = ctx
        .run_streamed(StageAction::ListPackages, &available_spec, None, false)
        .await;
    if !available.is_success() {
        if !available.was_cancelled {
            ctx.warn(format!("Could not list available packages (exit code {})", available.exit_code));
        }
        return available;
    }

    let installed_records = parse_listing(ListingKind::Installed, &installed.aggregated_stdout);
    let available_records = parse_listing(ListingKind::Available, &available.aggregated_stdout);
    let (installed_count, available_count) = {
        let mut state = ctx.state.lock();
        state.installed.replace_all(installed_records);
        state.available.replace_all(available_records);
        (state.installed.len(), state.available.len())
    };
    info!(installed = installed_count, available = available_count, "Package lists refreshed");
    ctx.emit(EventPayload::PackagesRefreshed {
        installed: installed_count,
        available: available_count,
    });
    available
}

async fn customize(ctx: &ActionContext) -> RunOutcome {
    let plan = {
        let mut state = ctx.state.lock();
        let Some(root) = state.config.extracted_root() else {
            return missing("working folder");
        };
        let install = state.available.selected_names();
        let remove = state.installed.selected_names();
        state.installed.clear_statuses();
        build_plan(&PlanInputs {
            options: &state.config.customization,
            install: &install,
            remove: &remove,
            root: &root,
            tools: &state.config.tools,
        })
    };
    let packages: Vec<Option<String>> = plan.iter().map(|e| e.package.clone()).collect();
    let total = plan.len();

    let sequencer = BatchSequencer::new(ctx.runner.clone()).with_cancel_token(ctx.cancel.clone());
    let batch = sequencer
        .run(plan, |event| {
            match &event {
                BatchEvent::EntryStarted { index, .. } => {
                    if let Some(Some(name)) = packages.get(*index) {
                        ctx.state
                            .lock()
                            .installed
                            .apply_entry_status(name, EntryStatus::Running);
                    }
                }
                BatchEvent::EntryFinished { index, status, .. } => {
                    if let Some(Some(name)) = packages.get(*index) {
                        ctx.state.lock().installed.apply_entry_status(name, *status);
                    }
                }
                BatchEvent::Progress { completed, .. } => {
                    let percent = u8::try_from(completed * 100 / total.max(1)).unwrap_or(100);
                    ctx.emit(EventPayload::Progress {
                        action: StageAction::Customize,
                        percent,
                    });
                }
                BatchEvent::EntryOutput { .. }
                | BatchEvent::EntryWarning { .. }
                | BatchEvent::BatchFinished { .. } => {}
            }
            ctx.emit(EventPayload::Batch { event });
        })
        .await;

    if batch.cancelled {
        let (stdout, stderr) = batch
            .last_outcome()
            .map(|o| (o.aggregated_stdout.clone(), o.aggregated_stderr.clone()))
            .unwrap_or_default();
        let code = batch.last_outcome().map_or(-1, |o| o.exit_code);
        return RunOutcome::cancelled(code, stdout, stderr);
    }
    if batch.halted_at.is_some() {
        return batch
            .last_outcome()
            .cloned()
            .unwrap_or_else(|| RunOutcome::exited(1));
    }

    ctx.state.lock().customization_applied = true;
    let failed = batch.failed_indices().len();
    if failed > 0 {
        ctx.warn(format!("{failed} of {total} customization steps failed"));
    }
    RunOutcome::exited(0)
}

async fn repackage(ctx: &ActionContext) -> RunOutcome {
    let (xorriso, root, working_folder, options, logo) = {
        let state = ctx.state.lock();
        let config = &state.config;
        (
            config.tools.xorriso.clone(),
            config.extracted_root(),
            config.working_folder.clone(),
            config.repack_options(),
            config.boot_logo.clone(),
        )
    };
    let (Some(root), Some(working_folder)) = (root, working_folder) else {
        return missing("working folder");
    };
    let Some(options) = options else {
        return missing("output image");
    };

    if let Some(logo) = logo.filter(|l| l.exists()) {
        if let Err(e) = install_boot_logo(&logo, &root) {
            ctx.warn(format!("Failed to copy boot logo: {e}"));
        }
    }

    let spec = create_command(&xorriso, &root, &working_folder, &options);
    ctx.run_streamed(StageAction::Repackage, &spec, Some(ToolKind::Creation), true)
        .await
}

async fn run_command(ctx: &ActionContext) -> RunOutcome {
    let Some(argv) = ctx.command.clone().filter(|argv| !argv.is_empty()) else {
        return missing("command");
    };
    let Some(root) = ctx.state.lock().config.extracted_root() else {
        return missing("working folder");
    };

    info!(run_id = %ctx.run_id, command = %argv.join(" "), "Running command in target root");
    let spec = CommandSpec::new(argv).in_root(root);
    ctx.run_streamed(StageAction::RunCommand, &spec, None, true).await
}
