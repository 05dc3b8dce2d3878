//! The workflow configuration document.

use super::ToolPaths;
use crate::customize::CustomizationOptions;
use crate::errors::{RemasterError, Result};
use crate::image::{CompressionOptions, RepackOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Directory under the working folder that holds the extracted tree.
pub const DEFAULT_EXTRACT_DIR: &str = "extracted_iso";

/// What leaving the customization stage requires when nothing is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySelectionPolicy {
    /// An empty selection is a valid no-op (default).
    #[default]
    AllowNoop,
    /// At least one package must be selected, or customization applied.
    Block,
}

/// Configuration for one remaster run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Folder that holds the extracted tree and output.
    pub working_folder: Option<PathBuf>,
    /// Image to remaster.
    pub source_image: Option<PathBuf>,
    /// Image to write.
    pub output_image: Option<PathBuf>,
    /// Preseed file to inject.
    pub preseed: Option<PathBuf>,
    /// Boot menu background.
    pub boot_logo: Option<PathBuf>,
    /// Compression for the creation tool; `None` keeps the tool's defaults.
    pub compression: Option<CompressionOptions>,
    /// Customization batch options.
    pub customization: CustomizationOptions,
    /// Empty selection handling.
    pub empty_selection: EmptySelectionPolicy,
    /// Remove the extracted tree on finish.
    pub cleanup_on_finish: bool,
    /// Name of the extracted tree under the working folder.
    pub extract_dir: String,
    /// External tools.
    pub tools: ToolPaths,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            working_folder: None,
            source_image: None,
            output_image: None,
            preseed: None,
            boot_logo: None,
            compression: None,
            customization: CustomizationOptions::default(),
            empty_selection: EmptySelectionPolicy::AllowNoop,
            cleanup_on_finish: true,
            extract_dir: DEFAULT_EXTRACT_DIR.to_string(),
            tools: ToolPaths::default(),
        }
    }
}

impl WorkflowConfig {
    /// Creates a default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sets the working folder.
    #[must_use]
    pub fn with_working_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_folder = Some(path.into());
        self
    }

    /// Sets the source image.
    #[must_use]
    pub fn with_source_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_image = Some(path.into());
        self
    }

    /// Sets the output image.
    #[must_use]
    pub fn with_output_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_image = Some(path.into());
        self
    }

    /// Sets the empty selection policy.
    #[must_use]
    pub fn with_empty_selection(mut self, policy: EmptySelectionPolicy) -> Self {
        self.empty_selection = policy;
        self
    }

    /// Sets the tool paths.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// The extracted tree, once a working folder is set.
    #[must_use]
    pub fn extracted_root(&self) -> Option<PathBuf> {
        self.working_folder
            .as_ref()
            .map(|folder| folder.join(&self.extract_dir))
    }

    /// The extracted tree if it is a direct child of the working folder.
    ///
    /// This is the only path [`StagePipeline::finish`](crate::pipeline::StagePipeline::finish)
    /// will delete.
    #[must_use]
    pub fn removable_extracted_root(&self) -> Option<PathBuf> {
        if !is_plain_dir_name(&self.extract_dir) {
            return None;
        }
        let folder = self.working_folder.as_ref()?;
        let root = folder.join(&self.extract_dir);
        (root.parent() == Some(folder.as_path())).then_some(root)
    }

    /// Options for the creation invocation, once an output path is set.
    #[must_use]
    pub fn repack_options(&self) -> Option<RepackOptions> {
        self.output_image.as_ref().map(|output| RepackOptions {
            output: output.clone(),
            preseed: self.preseed.clone(),
            compression: self.compression.clone(),
        })
    }

    /// Checks values that would otherwise fail deep inside a command.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let empty_tools = self.tools.empty_fields();
        if !empty_tools.is_empty() {
            problems.push(format!("empty tool paths: {}", empty_tools.join(", ")));
        }
        if !is_plain_dir_name(&self.extract_dir) {
            problems.push(format!("extract_dir '{}' must be a plain directory name", self.extract_dir));
        }
        if let Some(compression) = &self.compression {
            if let Err(e) = compression.validate() {
                problems.push(e);
            }
        }
        if let Err(e) = self.customization.validate_hostname() {
            problems.push(e);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RemasterError::Config(problems.join("; ")))
        }
    }
}

/// One normal path component: no separators, no `.` or `..`, not absolute.
fn is_plain_dir_name(name: &str) -> bool {
    if name.contains(|c| c == '/' || c == '\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
