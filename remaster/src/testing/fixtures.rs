//! Test fixtures for working folders and extracted trees.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A working folder laid out like one that has been through extraction.
#[derive(Debug, Clone)]
pub struct WorkspaceFixture {
    /// The working folder.
    pub working_folder: PathBuf,
    /// The extracted image tree inside it.
    pub extracted: PathBuf,
}

impl WorkspaceFixture {
    /// Creates `extracted_dir` under `base` with an isolinux directory.
    pub fn create(base: &Path, extracted_dir: &str) -> io::Result<Self> {
        let extracted = base.join(extracted_dir);
        fs::create_dir_all(extracted.join("isolinux"))?;
        Ok(Self {
            working_folder: base.to_path_buf(),
            extracted,
        })
    }

    /// Writes a minimal `isolinux/isolinux.cfg`.
    pub fn with_isolinux_cfg(self) -> io::Result<Self> {
        fs::write(
            self.extracted.join("isolinux").join("isolinux.cfg"),
            "DEFAULT live\n",
        )?;
        Ok(self)
    }

    /// Writes a placeholder source image into the working folder.
    pub fn write_image(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.working_folder.join(name);
        fs::write(&path, b"image")?;
        Ok(path)
    }

    /// Writes an arbitrary file under the working folder.
    pub fn write_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.working_folder.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}
