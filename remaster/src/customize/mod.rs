//! Customization of the extracted root.
//!
//! [`build_plan`] turns [`CustomizationOptions`] and the caller's package
//! selections into the ordered batch the sequencer applies.

mod options;
mod plan;

pub use options::{BootstrapOptions, BootstrapVariant, CustomizationOptions, Desktop};
pub use plan::{build_plan, PlanInputs, BASE_PACKAGES, GNOME_PACKAGES};
