//! Remaster CLI
//!
//! Runs a remaster workflow described by a JSON config file.
//!
//! # Usage
//!
//! ```bash
//! # Check that the host tools are installed
//! remaster preflight --config remaster.json
//!
//! # Show the customization batch that would run
//! remaster plan --config remaster.json --remove thunderbird
//!
//! # Run every stage, removing and installing packages on the way
//! remaster run --config remaster.json --remove thunderbird --install htop
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use remaster::prelude::*;
use remaster::preflight;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remaster")]
#[command(author, version, about = "Remaster bootable disk images", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log command output as well
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that every host tool can be found
    Preflight {
        /// Workflow config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the customization batch for the given selections
    Plan {
        /// Workflow config file
        #[arg(short, long)]
        config: PathBuf,
        /// Packages to remove
        #[arg(long)]
        remove: Vec<String>,
        /// Packages to install
        #[arg(long)]
        install: Vec<String>,
    },

    /// Run every stage through to the finished image
    Run {
        /// Workflow config file
        #[arg(short, long)]
        config: PathBuf,
        /// Packages to remove
        #[arg(long)]
        remove: Vec<String>,
        /// Packages to install
        #[arg(long)]
        install: Vec<String>,
        /// Skip the host tool check
        #[arg(long)]
        skip_preflight: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, cli.verbose);

    let result = match cli.command {
        Commands::Preflight { config } => cmd_preflight(&config),
        Commands::Plan {
            config,
            remove,
            install,
        } => cmd_plan(&config, &remove, &install),
        Commands::Run {
            config,
            remove,
            install,
            skip_preflight,
        } => cmd_run(&config, &remove, &install, skip_preflight).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(json: bool, verbose: bool) {
    let default = if verbose { "remaster=debug" } else { "remaster=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn load_config(path: &Path) -> Result<WorkflowConfig> {
    let config = WorkflowConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn cmd_preflight(config: &Path) -> Result<()> {
    let config = load_config(config)?;
    preflight::check_host_tools(&config.tools)?;
    println!("All host tools found.");
    Ok(())
}

fn cmd_plan(config: &Path, remove: &[String], install: &[String]) -> Result<()> {
    let config = load_config(config)?;
    let root = config
        .extracted_root()
        .context("working_folder is not set")?;
    let plan = remaster::customize::build_plan(&remaster::customize::PlanInputs {
        options: &config.customization,
        install,
        remove,
        root: &root,
        tools: &config.tools,
    });

    if plan.is_empty() {
        println!("No configuration changes selected.");
        return Ok(());
    }
    for (index, entry) in plan.iter().enumerate() {
        let marker = if entry.on_failure == FailurePolicy::Halt { " (fatal)" } else { "" };
        println!("{:>2}. {}{marker}", index + 1, entry.label);
        println!("    {}", entry.command.build_argv(&config.tools.wrapper()).join(" "));
    }
    Ok(())
}

async fn cmd_run(config: &Path, remove: &[String], install: &[String], skip_preflight: bool) -> Result<()> {
    let config = load_config(config)?;
    if !skip_preflight {
        preflight::check_host_tools(&config.tools)?;
    }

    let pipeline = StagePipeline::with_process_runner(config, Arc::new(LoggingEventSink::default()));
    let canceller = pipeline.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the running action");
            canceller.cancel();
        }
    });

    // Image information, extraction, package listing.
    for _ in 0..3 {
        step(&pipeline).await?;
    }
    let installed = pipeline.installed();
    for kernel in installed.kernels() {
        info!(package = %kernel.name, version = %kernel.version, "Installed kernel");
    }

    for name in remove {
        if !pipeline.select_for_removal(name, true)? {
            warn!(package = %name, "Not installed, skipping removal");
        }
    }
    for name in install {
        if !pipeline.select_for_install(name, true)? {
            warn!(package = %name, "Not available, skipping installation");
        }
    }
    if pipeline.apply_customization()? {
        pipeline.wait_idle().await;
        check_result(&pipeline, StageAction::Customize)?;
    }

    step(&pipeline).await?;
    pipeline.advance()?;
    let cleaned_up = pipeline.finish()?;

    let output = pipeline.snapshot().config.output_image;
    if let Some(output) = output {
        println!("Wrote {}", output.display());
    }
    if cleaned_up {
        info!("Extracted tree removed");
    }
    Ok(())
}

/// Advances one stage and waits for its action.
async fn step(pipeline: &StagePipeline) -> Result<Stage> {
    let stage = pipeline.advance()?;
    info!(stage = %stage.title(), "Entered stage");
    pipeline.wait_idle().await;
    if let Some(action) = stage.entry_action() {
        check_result(pipeline, action)?;
    }
    Ok(stage)
}

fn check_result(pipeline: &StagePipeline, action: StageAction) -> Result<()> {
    match pipeline.snapshot().result(action) {
        Some(ActionResult::Cancelled) => bail!("{action} was cancelled"),
        Some(ActionResult::Failed { outcome }) if action.gates_exit() || action == StageAction::Customize => {
            bail!(
                "{action} failed with exit code {}: {}",
                outcome.exit_code,
                outcome.aggregated_stderr.trim()
            )
        }
        Some(ActionResult::Failed { outcome }) => {
            warn!(%action, code = outcome.exit_code, "Action failed, continuing");
            Ok(())
        }
        Some(ActionResult::Succeeded) | None => Ok(()),
    }
}
