//! Locations of external tools.

use crate::process::RootWrapper;
use serde::{Deserialize, Serialize};

/// Program names or paths for every external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Image extraction and creation tool.
    pub xorriso: String,
    /// Root wrapper.
    pub chroot: String,
    /// Shell used inside the root.
    pub shell: String,
    /// Base system bootstrapper.
    pub debootstrap: String,
    /// Package manager for installs and removals.
    pub apt_get: String,
    /// Package manager for listings.
    pub apt: String,
    /// Package reconfiguration tool.
    pub dpkg_reconfigure: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        let wrapper = RootWrapper::default();
        Self {
            xorriso: "xorriso".to_string(),
            chroot: wrapper.chroot,
            shell: wrapper.shell,
            debootstrap: "debootstrap".to_string(),
            apt_get: "apt-get".to_string(),
            apt: "apt".to_string(),
            dpkg_reconfigure: "dpkg-reconfigure".to_string(),
        }
    }
}

impl ToolPaths {
    /// The wrapper used to enter the target root.
    #[must_use]
    pub fn wrapper(&self) -> RootWrapper {
        RootWrapper {
            chroot: self.chroot.clone(),
            shell: self.shell.clone(),
        }
    }

    /// Tools that run on the host, as `(program, package)` pairs.
    #[must_use]
    pub fn host_tools(&self) -> Vec<(&str, &str)> {
        vec![
            (self.xorriso.as_str(), "xorriso"),
            (self.chroot.as_str(), "coreutils"),
            (self.debootstrap.as_str(), "debootstrap"),
        ]
    }

    /// Names of empty entries.
    pub(crate) fn empty_fields(&self) -> Vec<&'static str> {
        [
            ("xorriso", &self.xorriso),
            ("chroot", &self.chroot),
            ("shell", &self.shell),
            ("debootstrap", &self.debootstrap),
            ("apt_get", &self.apt_get),
            ("apt", &self.apt),
            ("dpkg_reconfigure", &self.dpkg_reconfigure),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
