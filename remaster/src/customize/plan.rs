//! Customization batch planning.

use super::{CustomizationOptions, Desktop};
use crate::batch::BatchEntrySpec;
use crate::config::ToolPaths;
use crate::process::{shell_quote, CommandSpec};
use std::path::Path;

/// Packages that make the root a bootable live system with an installer.
pub const BASE_PACKAGES: &[&str] = &[
    "ubuntu-standard",
    "casper",
    "discover",
    "laptop-detect",
    "os-prober",
    "network-manager",
    "net-tools",
    "wireless-tools",
    "wpagui",
    "locales",
    "grub-common",
    "grub-gfxpayload-lists",
    "grub-pc",
    "grub-pc-bin",
    "grub2-common",
    "grub-efi-amd64-signed",
    "shim-signed",
    "mtools",
    "binutils",
    "ubiquity",
    "ubiquity-casper",
    "ubiquity-frontend-gtk",
    "ubiquity-slideshow-ubuntu",
    "ubiquity-ubuntu-artwork",
];

/// GNOME desktop packages.
pub const GNOME_PACKAGES: &[&str] = &[
    "plymouth-themes",
    "ubuntu-gnome-desktop",
    "ubuntu-gnome-wallpapers",
];

/// What a customization batch is built from.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    /// Options chosen by the caller.
    pub options: &'a CustomizationOptions,
    /// Packages selected for installation.
    pub install: &'a [String],
    /// Packages selected for removal.
    pub remove: &'a [String],
    /// The extracted root.
    pub root: &'a Path,
    /// Tool locations.
    pub tools: &'a ToolPaths,
}

/// Builds the ordered customization batch.
///
/// Bootstrapping runs on the host and halts the batch on failure; every
/// other entry runs inside the root and continues on failure. Removals get
/// one entry per package so each package's status is tracked on its own.
#[must_use]
pub fn build_plan(inputs: &PlanInputs<'_>) -> Vec<BatchEntrySpec> {
    let PlanInputs {
        options,
        install,
        remove,
        root,
        tools,
    } = *inputs;
    let apt_get = tools.apt_get.as_str();
    let mut plan = Vec::new();

    if let Some(bootstrap) = &options.bootstrap {
        let command = CommandSpec::program(&tools.debootstrap)
            .arg("--arch")
            .arg(&bootstrap.arch)
            .arg("--variant")
            .arg(bootstrap.variant.to_string())
            .arg(&bootstrap.release)
            .arg_path(root)
            .arg(&bootstrap.mirror);
        plan.push(BatchEntrySpec::fatal("Bootstrap Base System", command));
    }

    if options.base_packages {
        let command = CommandSpec::new([apt_get, "install", "-y", "--force-yes", "--allow-unauthenticated"])
            .args(BASE_PACKAGES.iter().copied())
            .in_root(root);
        plan.push(BatchEntrySpec::new("Install Base Packages", command));
    }

    if let Some(Desktop::Gnome) = options.desktop {
        let command = CommandSpec::new([apt_get, "install", "-y", "--no-install-recommends"])
            .args(GNOME_PACKAGES.iter().copied())
            .in_root(root);
        plan.push(BatchEntrySpec::new("Install GNOME Desktop", command));
    }

    if !install.is_empty() {
        let command = CommandSpec::new([apt_get, "install", "-y"])
            .args(install.iter().cloned())
            .in_root(root);
        plan.push(BatchEntrySpec::new("Install Applications", command));
    }

    for package in remove {
        let command = CommandSpec::new([apt_get, "purge", "-y", package.as_str()]).in_root(root);
        plan.push(BatchEntrySpec::new(format!("Remove {package}"), command).for_package(package));
    }

    if let Some(hostname) = options.hostname.as_deref().filter(|h| !h.is_empty()) {
        let quoted = shell_quote(hostname);
        let command = CommandSpec::new(["echo", quoted.as_str(), ">", "/etc/hostname"]).shell_in_root(root);
        plan.push(BatchEntrySpec::new("Set Hostname", command));
    }

    if options.locale.as_deref().is_some_and(|l| !l.is_empty()) {
        let command = CommandSpec::new([tools.dpkg_reconfigure.as_str(), "locales"]).in_root(root);
        plan.push(BatchEntrySpec::new("Reconfigure Locales", command));
    }

    if options.upgrade {
        let command = CommandSpec::new([apt_get, "upgrade", "-y"]).in_root(root);
        plan.push(BatchEntrySpec::new("Upgrade Packages", command));
    }

    if options.autoremove {
        let command = CommandSpec::new([apt_get, "autoremove", "-y"]).in_root(root);
        plan.push(BatchEntrySpec::new("Run apt Autoremove", command));
    }

    plan
}
