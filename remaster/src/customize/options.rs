//! Customization options.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Debootstrap variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapVariant {
    /// Essential packages and apt only.
    #[default]
    Minbase,
    /// Priority standard packages.
    Standard,
}

impl fmt::Display for BootstrapVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minbase => write!(f, "minbase"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

/// Base system bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapOptions {
    /// Target architecture.
    pub arch: String,
    /// Debootstrap variant.
    #[serde(default)]
    pub variant: BootstrapVariant,
    /// Release codename.
    pub release: String,
    /// Archive mirror.
    pub mirror: String,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            arch: "amd64".to_string(),
            variant: BootstrapVariant::Minbase,
            release: "noble".to_string(),
            mirror: "http://us.archive.ubuntu.com/ubuntu/".to_string(),
        }
    }
}

/// Desktop environment to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Desktop {
    /// GNOME without recommends.
    Gnome,
}

/// Everything the customization batch can do besides package selections.
///
/// The default does nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomizationOptions {
    /// Bootstrap a base system into the root first.
    pub bootstrap: Option<BootstrapOptions>,
    /// Install the live-system base packages.
    pub base_packages: bool,
    /// Desktop environment.
    pub desktop: Option<Desktop>,
    /// Hostname written to `/etc/hostname`.
    pub hostname: Option<String>,
    /// Locale to reconfigure.
    pub locale: Option<String>,
    /// Upgrade all packages.
    pub upgrade: bool,
    /// Remove packages no longer needed.
    pub autoremove: bool,
}

impl CustomizationOptions {
    /// Creates options that do nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bootstraps a base system first.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: BootstrapOptions) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    /// Installs the base packages.
    #[must_use]
    pub fn with_base_packages(mut self) -> Self {
        self.base_packages = true;
        self
    }

    /// Installs a desktop.
    #[must_use]
    pub fn with_desktop(mut self, desktop: Desktop) -> Self {
        self.desktop = Some(desktop);
        self
    }

    /// Sets the hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Reconfigures locales.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Upgrades packages.
    #[must_use]
    pub fn with_upgrade(mut self) -> Self {
        self.upgrade = true;
        self
    }

    /// Runs autoremove.
    #[must_use]
    pub fn with_autoremove(mut self) -> Self {
        self.autoremove = true;
        self
    }

    /// Returns a problem with the hostname, if any.
    ///
    /// Hostnames are 1..=63 characters of ASCII letters, digits and `-`, and
    /// do not start or end with `-`.
    pub fn validate_hostname(&self) -> Result<(), String> {
        let Some(hostname) = self.hostname.as_deref().filter(|h| !h.is_empty()) else {
            return Ok(());
        };
        let valid = hostname.len() <= 63
            && hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !hostname.starts_with('-')
            && !hostname.ends_with('-');
        if valid {
            Ok(())
        } else {
            Err(format!("invalid hostname '{hostname}'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_does_nothing() {
        let options = CustomizationOptions::default();
        assert!(options.bootstrap.is_none());
        assert!(!options.base_packages && !options.upgrade && !options.autoremove);
    }

    #[test]
    fn test_hostname_validation() {
        assert!(CustomizationOptions::new().with_hostname("live-box01").validate_hostname().is_ok());
        assert!(CustomizationOptions::new().validate_hostname().is_ok());
        assert!(CustomizationOptions::new().with_hostname("-bad").validate_hostname().is_err());
        assert!(CustomizationOptions::new()
            .with_hostname("x; rm -rf /")
            .validate_hostname()
            .is_err());
        assert!(CustomizationOptions::new()
            .with_hostname("a".repeat(64))
            .validate_hostname()
            .is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let options: CustomizationOptions =
            serde_json::from_str(r#"{"upgrade": true, "desktop": "gnome"}"#).unwrap();
        assert!(options.upgrade);
        assert_eq!(options.desktop, Some(Desktop::Gnome));
        assert!(options.hostname.is_none());
    }
}
