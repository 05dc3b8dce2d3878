//! Extraction and creation invocations.

use super::CompressionOptions;
use crate::process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hybrid BIOS/EFI boot layout with Joliet and Rock Ridge.
const CREATE_FLAGS: &[&str] = &[
    "-as",
    "mkisofs",
    "-r",
    "-J",
    "-joliet-long",
    "-l",
    "-cache-inodes",
    "-follow-links",
];

const BOOT_FLAGS: &[&str] = &[
    "-b",
    "isolinux/isolinux.bin",
    "-c",
    "isolinux/boot.cat",
    "-no-emul-boot",
    "-boot-load-size",
    "4",
    "-boot-info-table",
    "-isohybrid-mbr",
    "isolinux/isohdpfx.bin",
    "-eltorito-alt-boot",
    "-e",
    "boot/grub/efi.img",
    "-no-emul-boot",
    "-isohybrid-gpt-basdat",
];

/// Inputs to the creation invocation besides the tree itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepackOptions {
    /// Image to write.
    pub output: PathBuf,
    /// Preseed file to inject, if it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preseed: Option<PathBuf>,
    /// Compression; `None` leaves the tool's defaults alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionOptions>,
}

/// `xorriso -osirrox on -indev <image> -extract / <dest>`.
#[must_use]
pub fn extract_command(xorriso: &str, image: &Path, dest: &Path) -> CommandSpec {
    CommandSpec::program(xorriso)
        .args(["-osirrox", "on", "-indev"])
        .arg_path(image)
        .args(["-extract", "/"])
        .arg_path(dest)
}

/// Builds the creation invocation for `tree`, run from `working_folder`.
///
/// The preseed flag is only added when the file exists. The tree is always
/// the last argument.
#[must_use]
pub fn create_command(
    xorriso: &str,
    tree: &Path,
    working_folder: &Path,
    options: &RepackOptions,
) -> CommandSpec {
    let mut spec = CommandSpec::program(xorriso)
        .args(CREATE_FLAGS.iter().copied())
        .arg("-o")
        .arg_path(&options.output)
        .args(BOOT_FLAGS.iter().copied());

    if let Some(preseed) = options.preseed.as_deref().filter(|p| p.exists()) {
        spec = spec.arg("-preseed").arg_path(preseed);
    }
    if let Some(compression) = &options.compression {
        spec = spec.args(compression.to_args());
    }

    spec.arg_path(tree).current_dir(working_folder)
}
