//! `apt list` parsing.

use super::PackageRecord;
use crate::process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version shown when a line carries no version token.
const UNKNOWN_VERSION: &str = "Unknown";

/// Which listing to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    /// Packages installed in the root (`apt list --installed`).
    Installed,
    /// Packages the root's sources offer (`apt list`).
    Available,
}

/// The listing command, run directly inside `root`.
#[must_use]
pub fn listing_command(kind: ListingKind, apt: &str, root: &Path) -> CommandSpec {
    let spec = CommandSpec::new([apt, "list"]);
    let spec = match kind {
        ListingKind::Installed => spec.arg("--installed"),
        ListingKind::Available => spec,
    };
    spec.in_root(root)
}

/// Parses `name/suite version,now arch [flags]` lines.
///
/// Lines without `/` are skipped, as is the `Listing...` banner. Installed
/// listings also require the `,now` marker.
#[must_use]
pub fn parse_listing(kind: ListingKind, text: &str) -> Vec<PackageRecord> {
    text.lines()
        .filter_map(|line| parse_line(kind, line.trim()))
        .collect()
}

fn parse_line(kind: ListingKind, line: &str) -> Option<PackageRecord> {
    if !line.contains('/') || line.starts_with("Listing...") {
        return None;
    }
    if kind == ListingKind::Installed && !line.contains(",now") {
        return None;
    }

    let (name, _) = line.split_once('/')?;
    if name.is_empty() {
        return None;
    }
    let version = line
        .split_whitespace()
        .nth(1)
        .and_then(|token| token.split(',').next())
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_VERSION);

    Some(PackageRecord::new(name, version))
}
