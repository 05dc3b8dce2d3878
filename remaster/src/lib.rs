//! # Remaster
//!
//! Staged orchestration of external tools for remastering bootable disk
//! images.
//!
//! A remaster moves through a fixed sequence of stages: choose a working
//! folder and source image, inspect it, extract it, customize the extracted
//! root, and write a new image. This crate provides:
//!
//! - **Process runner**: spawns one external command, streams its output and
//!   supports cancellation
//! - **Progress parsing**: turns tool output into percentages
//! - **Batch sequencer**: runs an ordered list of commands strictly one after
//!   another with per-entry failure policies
//! - **Stage pipeline**: a state machine that gates navigation on stage
//!   preconditions and runs each stage's action in the background
//! - **Package records**: installed and available packages with selection
//!   and per-package action status
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use remaster::prelude::*;
//! use std::sync::Arc;
//!
//! let config = WorkflowConfig::new()
//!     .with_working_folder("/srv/remaster")
//!     .with_source_image("/srv/remaster/ubuntu.iso")
//!     .with_output_image("/srv/remaster/custom.iso");
//! let pipeline = StagePipeline::with_process_runner(config, Arc::new(LoggingEventSink::default()));
//!
//! pipeline.advance()?; // inspect
//! pipeline.wait_idle().await;
//! pipeline.advance()?; // extract
//! pipeline.wait_idle().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod customize;
pub mod errors;
pub mod events;
pub mod image;
pub mod packages;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod progress;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::{
        BatchEntrySpec, BatchEvent, BatchOutcome, BatchSequencer, FailurePolicy,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{EmptySelectionPolicy, ToolPaths, WorkflowConfig};
    pub use crate::core::{
        EntryStatus, EventPayload, PackageStatus, Stage, StageAction, WorkflowEvent,
    };
    pub use crate::customize::{BootstrapOptions, CustomizationOptions, Desktop};
    pub use crate::errors::{
        NotAllowedError, PreconditionError, RemasterError, Result,
    };
    pub use crate::events::{
        ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::image::{CompressionMethod, CompressionOptions, ImageInfo};
    pub use crate::packages::{PackageRecord, PackageSet};
    pub use crate::pipeline::{ActionResult, PipelineState, StagePipeline};
    pub use crate::process::{
        CommandRunner, CommandSpec, OutputChunk, ProcessRunner, RunHandle, RunOutcome,
    };
    pub use crate::progress::{parse_progress, ToolKind};
}
