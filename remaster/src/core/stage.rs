//! Workflow stages and the actions bound to them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One named step of the remastering workflow.
///
/// Variants are declared in workflow order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Choose the working folder and the source image.
    WorkingFolderSelect,
    /// Inspect the source image metadata.
    ImageInfo,
    /// Extract the image contents into the working tree.
    Extraction,
    /// Select and apply package/filesystem changes inside the target root.
    Customization,
    /// Rebuild a bootable image from the working tree.
    Repackaging,
    /// Terminal stage.
    Finished,
}

impl Default for Stage {
    fn default() -> Self {
        Self::first()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkingFolderSelect => write!(f, "working_folder_select"),
            Self::ImageInfo => write!(f, "image_info"),
            Self::Extraction => write!(f, "extraction"),
            Self::Customization => write!(f, "customization"),
            Self::Repackaging => write!(f, "repackaging"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Self; 6] = [
        Self::WorkingFolderSelect,
        Self::ImageInfo,
        Self::Extraction,
        Self::Customization,
        Self::Repackaging,
        Self::Finished,
    ];

    /// The stage a workflow starts in.
    #[must_use]
    pub const fn first() -> Self {
        Self::WorkingFolderSelect
    }

    /// Position of this stage in the workflow (0-based).
    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// The following stage, or `None` for the terminal stage.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The preceding stage, or `None` for the first stage.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Returns true for the terminal stage.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// The action started when this stage is entered.
    #[must_use]
    pub fn entry_action(self) -> Option<StageAction> {
        match self {
            Self::ImageInfo => Some(StageAction::InspectImage),
            Self::Extraction => Some(StageAction::Extract),
            Self::Customization => Some(StageAction::ListPackages),
            Self::Repackaging => Some(StageAction::Repackage),
            Self::WorkingFolderSelect | Self::Finished => None,
        }
    }

    /// Human-readable title.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::WorkingFolderSelect => "Select working folder",
            Self::ImageInfo => "Image information",
            Self::Extraction => "Extract image",
            Self::Customization => "Customize system",
            Self::Repackaging => "Create image",
            Self::Finished => "Finished",
        }
    }
}

/// A side-effecting action owned by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    /// Query the source image metadata.
    InspectImage,
    /// Extract the source image into the working tree.
    Extract,
    /// Query installed and available packages in the target root.
    ListPackages,
    /// Run the customization batch against the target root.
    Customize,
    /// Build the output image.
    Repackage,
    /// Run one user command inside the target root.
    RunCommand,
}

impl fmt::Display for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InspectImage => write!(f, "inspect_image"),
            Self::Extract => write!(f, "extract"),
            Self::ListPackages => write!(f, "list_packages"),
            Self::Customize => write!(f, "customize"),
            Self::Repackage => write!(f, "repackage"),
            Self::RunCommand => write!(f, "run_command"),
        }
    }
}

impl StageAction {
    /// Returns true if leaving the owning stage requires this action to have succeeded.
    #[must_use]
    pub fn gates_exit(self) -> bool {
        matches!(self, Self::Extract | Self::Repackage)
    }
}
