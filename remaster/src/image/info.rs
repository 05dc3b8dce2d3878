//! Image metadata.

use crate::process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

const UNKNOWN: &str = "Unknown";

/// Architectures recognised in image file names, checked in order.
const ARCHITECTURES: &[&str] = &["amd64", "i386", "arm64"];

/// Metadata shown for the source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Volume system id.
    pub name: String,
    /// Application id, used as the version.
    pub version: String,
    /// Architecture guessed from the file name.
    pub architecture: String,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            version: UNKNOWN.to_string(),
            architecture: UNKNOWN.to_string(),
        }
    }
}

/// `xorriso -indev <image> -report_system_area as_mkisofs`.
#[must_use]
pub fn inspect_command(xorriso: &str, image: &Path) -> CommandSpec {
    CommandSpec::program(xorriso)
        .arg("-indev")
        .arg_path(image)
        .args(["-report_system_area", "as_mkisofs"])
}

/// Builds [`ImageInfo`] from the inspection report and the image path.
#[must_use]
pub fn parse_report(report: &str, image: &Path) -> ImageInfo {
    let mut info = ImageInfo {
        architecture: architecture_from_filename(image).to_string(),
        ..ImageInfo::default()
    };
    for line in report.trim().lines() {
        if let Some(value) = field_value(line, "System_ID=") {
            info.name = value;
        } else if let Some(value) = field_value(line, "Application_ID=") {
            info.version = value;
        }
    }
    info
}

fn field_value(line: &str, key: &str) -> Option<String> {
    let rest = line.strip_prefix(key)?;
    let value = rest.split('=').next().unwrap_or_default();
    Some(value.trim_matches('\'').to_string())
}

/// Guesses the architecture from the image's file name.
#[must_use]
pub fn architecture_from_filename(image: &Path) -> &'static str {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    ARCHITECTURES
        .iter()
        .find(|arch| name.contains(*arch))
        .copied()
        .unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_report() {
        let report = "\
System_ID='Ubuntu'
Application_ID='22.04.3 LTS'
Volume_ID='Ubuntu 22.04.3 LTS amd64'
";
        let info = parse_report(report, Path::new("/isos/ubuntu-22.04.3-desktop-AMD64.iso"));
        assert_eq!(
            info,
            ImageInfo {
                name: "Ubuntu".to_string(),
                version: "22.04.3 LTS".to_string(),
                architecture: "amd64".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_empty_report() {
        let info = parse_report("", Path::new("custom.iso"));
        assert_eq!(info, ImageInfo::default());
    }

    #[test]
    fn test_architecture_from_filename() {
        assert_eq!(architecture_from_filename(Path::new("debian-i386.iso")), "i386");
        assert_eq!(architecture_from_filename(Path::new("/arm64/plain.iso")), "Unknown");
        assert_eq!(architecture_from_filename(Path::new("x-arm64.iso")), "arm64");
    }

    #[test]
    fn test_inspect_command() {
        let spec = inspect_command("xorriso", Path::new("/isos/a.iso"));
        assert_eq!(
            spec.argv,
            vec!["xorriso", "-indev", "/isos/a.iso", "-report_system_area", "as_mkisofs"]
        );
        assert!(spec.target_root.is_none());
    }
}
