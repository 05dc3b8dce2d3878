//! Command specifications and argv construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Programs used to enter a target root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootWrapper {
    /// The chroot-style wrapper (`chroot`).
    pub chroot: String,
    /// The shell used for shell-wrapped commands (`/bin/bash`).
    pub shell: String,
}

impl Default for RootWrapper {
    fn default() -> Self {
        Self {
            chroot: "chroot".to_string(),
            shell: "/bin/bash".to_string(),
        }
    }
}

/// One external command and how to launch it.
///
/// With `target_root` set and `shell_wrap` off, argv runs directly inside the
/// root with no shell in between, which is what package managers need. With
/// `shell_wrap` on, argv is joined with single spaces and handed to a shell
/// inside the root. The join does not escape anything: an argument containing
/// spaces or shell metacharacters is split or interpreted by that shell.
/// Quote untrusted values with [`shell_quote`] before putting them in argv.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program and arguments.
    pub argv: Vec<String>,
    /// Working directory for the spawned process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Root filesystem to chroot into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_root: Option<PathBuf>,
    /// Join argv and run it through a shell.
    #[serde(default)]
    pub shell_wrap: bool,
}

impl CommandSpec {
    /// Creates a spec from a full argv.
    #[must_use]
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Creates a spec for a program with no arguments yet.
    #[must_use]
    pub fn program(program: impl Into<String>) -> Self {
        Self::new([program.into()])
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Runs argv directly inside `root`.
    #[must_use]
    pub fn in_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.target_root = Some(root.into());
        self.shell_wrap = false;
        self
    }

    /// Runs argv through a shell inside `root`.
    #[must_use]
    pub fn shell_in_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.target_root = Some(root.into());
        self.shell_wrap = true;
        self
    }

    /// The program named by argv (before any wrapping).
    #[must_use]
    pub fn program_name(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    /// The space-joined argv handed to the shell.
    #[must_use]
    pub fn joined(&self) -> String {
        self.argv.join(" ")
    }

    /// Builds the argv that is actually spawned.
    ///
    /// - no root, no shell: argv unchanged
    /// - root, direct: `[chroot, root] ++ argv`
    /// - root, shell: `[chroot, root, shell, "-c", argv.join(" ")]`
    /// - no root, shell: `[shell, "-c", argv.join(" ")]`
    #[must_use]
    pub fn build_argv(&self, wrapper: &RootWrapper) -> Vec<String> {
        let mut out = Vec::with_capacity(self.argv.len() + 4);
        if let Some(root) = &self.target_root {
            out.push(wrapper.chroot.clone());
            out.push(root.to_string_lossy().into_owned());
        }
        if self.shell_wrap {
            out.push(wrapper.shell.clone());
            out.push("-c".to_string());
            out.push(self.joined());
        } else {
            out.extend(self.argv.iter().cloned());
        }
        out
    }
}

/// Single-quotes a word for a POSIX shell.
///
/// Words made only of safe characters are returned unchanged.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '+' | ','));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wrapper() -> RootWrapper {
        RootWrapper::default()
    }

    #[test]
    fn test_build_argv_without_root_is_unchanged() {
        let spec = CommandSpec::new(["xorriso", "-indev", "my image.iso"]);
        assert_eq!(spec.build_argv(&wrapper()), spec.argv);
    }

    #[test]
    fn test_build_argv_direct_in_root() {
        let spec = CommandSpec::new(["apt-get", "purge", "-y", "vim"]).in_root("/work/root");
        assert_eq!(
            spec.build_argv(&wrapper()),
            vec!["chroot", "/work/root", "apt-get", "purge", "-y", "vim"]
        );
    }

    #[test]
    fn test_build_argv_shell_in_root() {
        let spec = CommandSpec::new(["echo", "host", ">", "/etc/hostname"]).shell_in_root("/r");
        assert_eq!(
            spec.build_argv(&wrapper()),
            vec!["chroot", "/r", "/bin/bash", "-c", "echo host > /etc/hostname"]
        );
    }

    #[test]
    fn test_build_argv_shell_on_host() {
        let mut spec = CommandSpec::new(["true"]);
        spec.shell_wrap = true;
        assert_eq!(spec.build_argv(&wrapper()), vec!["/bin/bash", "-c", "true"]);
    }

    #[test]
    fn test_join_is_lossy_for_spaces() {
        let spec = CommandSpec::new(["touch", "a b"]).shell_in_root("/r");
        // The shell sees two words; this is the documented behavior.
        assert_eq!(spec.build_argv(&wrapper())[4], "touch a b");
    }

    #[test]
    fn test_builder_helpers() {
        let spec = CommandSpec::program("debootstrap")
            .args(["--arch", "amd64"])
            .arg_path(Path::new("/tmp/root"))
            .current_dir("/tmp");
        assert_eq!(spec.program_name(), "debootstrap");
        assert_eq!(spec.argv.len(), 4);
        assert_eq!(spec.working_directory, Some(PathBuf::from("/tmp")));
        assert!(spec.target_root.is_none());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("remaster-01"), "remaster-01");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("x; rm -rf /"), "'x; rm -rf /'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
