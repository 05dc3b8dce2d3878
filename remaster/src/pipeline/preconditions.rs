//! Stage exit preconditions.

use super::PipelineState;
use crate::config::EmptySelectionPolicy;
use crate::core::{Stage, StageAction};
use crate::errors::PreconditionError;

/// Checks that the current stage may be left forwards.
///
/// - working folder selection: a working folder, an existing source image
///   and a config that passes [`crate::config::WorkflowConfig::validate`]
/// - extraction: the extraction succeeded
/// - customization: an output path, and under
///   [`EmptySelectionPolicy::Block`] a selection or an applied batch
/// - repackaging: the image was written
pub fn check_exit(state: &PipelineState) -> Result<(), PreconditionError> {
    let stage = state.stage;
    let fail = |reason: &str| Err(PreconditionError::new(stage, reason));
    let config = &state.config;

    match stage {
        Stage::WorkingFolderSelect => {
            if config.working_folder.is_none() {
                return fail("Please select a working folder");
            }
            match &config.source_image {
                None => return fail("Please select a source image"),
                Some(path) if !path.is_file() => {
                    return Err(PreconditionError::new(
                        stage,
                        format!("Source image does not exist: {}", path.display()),
                    ));
                }
                Some(_) => {}
            }
            config
                .validate()
                .map_err(|e| PreconditionError::new(stage, e.to_string()))
        }
        Stage::ImageInfo => Ok(()),
        Stage::Extraction => {
            if state.succeeded(StageAction::Extract) {
                Ok(())
            } else {
                fail("The image has not been extracted")
            }
        }
        Stage::Customization => {
            if config.output_image.is_none() {
                return fail("Please specify the output image path");
            }
            let blocked = config.empty_selection == EmptySelectionPolicy::Block
                && !state.has_selection()
                && !state.customization_applied;
            if blocked {
                fail("No packages selected")
            } else {
                Ok(())
            }
        }
        Stage::Repackaging => {
            if state.succeeded(StageAction::Repackage) {
                Ok(())
            } else {
                fail("The output image has not been created")
            }
        }
        Stage::Finished => fail("The workflow is finished"),
    }
}
