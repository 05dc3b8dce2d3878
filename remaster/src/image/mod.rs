//! Bootable image handling through the external image tool.
//!
//! This module provides:
//! - Image metadata inspection and report parsing
//! - The extraction and creation invocations
//! - Compression options for the creation tool
//! - Boot logo installation into an extracted tree

mod commands;
mod compression;
mod info;
mod logo;

pub use commands::{create_command, extract_command, RepackOptions};
pub use compression::{CompressionMethod, CompressionOptions};
pub use info::{architecture_from_filename, inspect_command, parse_report, ImageInfo};
pub use logo::{install_boot_logo, LOGO_FILE_NAME};
