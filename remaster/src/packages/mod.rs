//! Package records parsed from the target root's package manager.
//!
//! This module provides:
//! - [`PackageRecord`] and the name-keyed [`PackageSet`]
//! - Parsing of `apt list` output
//! - The listing commands run inside the target root

mod listing;
mod record;

pub use listing::{listing_command, parse_listing, ListingKind};
pub use record::{PackageRecord, PackageSet};
