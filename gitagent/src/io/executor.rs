//! Seams between orchestration and the repository.
//!
//! [`RepositoryInspector`] reads state; [`CommandExecutor`] runs one git
//! subcommand. [`crate::io::git::Git`] implements both against a real
//! repository. Tests substitute scripted implementations.

use crate::core::types::RepositorySnapshot;

/// Read-only repository introspection. Never fails: problems are reported as text.
pub trait RepositoryInspector {
    /// Fresh snapshot of the working tree; nothing is cached between calls.
    fn snapshot(&self) -> RepositorySnapshot;

    /// `git branch` listing.
    fn branches(&self) -> String;

    /// `git status` output.
    fn status(&self) -> String;
}

/// Runs one git subcommand (optional `git` prefix) and returns its text output.
///
/// Failures come back as text starting with `Error:`; callers branch on content.
pub trait CommandExecutor {
    fn execute(&self, raw_command: &str) -> String;
}

/// True if `output` is an executor failure.
pub fn is_error_output(output: &str) -> bool {
    output.trim_start().starts_with("Error:")
}
