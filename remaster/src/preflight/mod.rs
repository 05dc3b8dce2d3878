//! Host tool preflight.
//!
//! Checks that the tools run on the host are on `PATH` before any stage
//! starts, so a missing tool is reported once instead of as a `-1` exit code
//! halfway through the workflow.

use crate::config::ToolPaths;
use crate::errors::{RemasterError, Result};
use std::path::PathBuf;
use tracing::debug;

/// Returns the resolved path of `program`, if it can be found.
#[must_use]
pub fn locate(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Returns true if `program` can be found.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    locate(program).is_some()
}

/// Checks `(program, package)` pairs and reports every missing program.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();
    for (program, package) in tools {
        match locate(program) {
            Some(path) => debug!(program, path = %path.display(), "Found host tool"),
            None => missing.push((*program, *package)),
        }
    }

    if missing.is_empty() {
        return Ok(());
    }
    let list = missing
        .iter()
        .map(|(program, package)| format!("{program} (install: {package})"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(RemasterError::Config(format!("Missing required host tools: {list}")))
}

/// Checks the configured host tools.
pub fn check_host_tools(tools: &ToolPaths) -> Result<()> {
    check_required_tools(&tools.host_tools())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        assert!(check_required_tools(&[("sh", "dash"), ("ls", "coreutils")]).is_ok());
    }

    #[test]
    fn test_check_required_tools_lists_every_missing_tool() {
        let err = check_required_tools(&[
            ("nonexistent_command_xyz", "fake-package"),
            ("sh", "dash"),
            ("another_missing_tool_abc", "other-package"),
        ])
        .unwrap_err()
        .to_string();
        assert!(err.contains("nonexistent_command_xyz (install: fake-package)"));
        assert!(err.contains("another_missing_tool_abc (install: other-package)"));
        assert!(!err.contains("dash"));
    }

    #[test]
    fn test_check_host_tools_with_missing_paths() {
        let tools = ToolPaths {
            xorriso: "/nonexistent/xorriso".to_string(),
            ..ToolPaths::default()
        };
        assert!(check_host_tools(&tools).is_err());
    }
}
