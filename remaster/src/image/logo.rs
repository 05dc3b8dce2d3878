//! Boot logo installation.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the logo inside `isolinux/`.
pub const LOGO_FILE_NAME: &str = "logo.png";

const MENU_BACKGROUND: &str = "MENU BACKGROUND logo.png";
const MENU_LINES: &str = "\nUI vesamenu.c32\nMENU BACKGROUND logo.png\n";

/// Copies `logo` into `<tree>/isolinux/logo.png` and points the boot menu at it.
///
/// `isolinux.cfg` is only appended to when it already exists and does not
/// name the logo yet, so repeated installs leave it unchanged.
pub fn install_boot_logo(logo: &Path, tree: &Path) -> io::Result<PathBuf> {
    let isolinux = tree.join("isolinux");
    fs::create_dir_all(&isolinux)?;

    let dest = isolinux.join(LOGO_FILE_NAME);
    fs::copy(logo, &dest)?;

    let cfg = isolinux.join("isolinux.cfg");
    if cfg.exists() {
        if fs::read_to_string(&cfg)?.lines().any(|l| l.trim() == MENU_BACKGROUND) {
            debug!(cfg = %cfg.display(), "Boot menu background already set");
            return Ok(dest);
        }
        let mut file = OpenOptions::new().append(true).open(&cfg)?;
        file.write_all(MENU_LINES.as_bytes())?;
        debug!(cfg = %cfg.display(), "Boot menu background set");
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_creates_isolinux_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("splash.png");
        fs::write(&logo, b"png").unwrap();
        let tree = dir.path().join("extracted_iso");

        let dest = install_boot_logo(&logo, &tree).unwrap();
        assert_eq!(dest, tree.join("isolinux").join("logo.png"));
        assert_eq!(fs::read(&dest).unwrap(), b"png");
        assert!(!tree.join("isolinux").join("isolinux.cfg").exists());
    }

    #[test]
    fn test_install_appends_menu_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("splash.png");
        fs::write(&logo, b"png").unwrap();
        let isolinux = dir.path().join("isolinux");
        fs::create_dir_all(&isolinux).unwrap();
        fs::write(isolinux.join("isolinux.cfg"), "DEFAULT live").unwrap();

        install_boot_logo(&logo, dir.path()).unwrap();
        let cfg = fs::read_to_string(isolinux.join("isolinux.cfg")).unwrap();
        assert_eq!(cfg, "DEFAULT live\nUI vesamenu.c32\nMENU BACKGROUND logo.png\n");
    }

    #[test]
    fn test_repeated_install_appends_once() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("splash.png");
        fs::write(&logo, b"png").unwrap();
        let isolinux = dir.path().join("isolinux");
        fs::create_dir_all(&isolinux).unwrap();
        fs::write(isolinux.join("isolinux.cfg"), "DEFAULT live").unwrap();

        install_boot_logo(&logo, dir.path()).unwrap();
        install_boot_logo(&logo, dir.path()).unwrap();
        let cfg = fs::read_to_string(isolinux.join("isolinux.cfg")).unwrap();
        assert_eq!(cfg.matches("MENU BACKGROUND logo.png").count(), 1);
        assert_eq!(cfg.matches("UI vesamenu.c32").count(), 1);
    }

    #[test]
    fn test_missing_logo_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(install_boot_logo(&dir.path().join("nope.png"), dir.path()).is_err());
    }
}
