//! Small helpers for identifiers and timestamps.

mod timestamps;

pub use timestamps::{elapsed_ms, iso_timestamp};

use uuid::Uuid;

/// Generates a fresh run id for a pipeline instance.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}
