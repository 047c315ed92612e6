//! Git adapter: repository inspection and command execution.
//!
//! Every invocation runs with a timeout, bounded output, no terminal prompts
//! and a no-op editor, so nothing can block on interactive input.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::command::{
    inject_safety_flags, naive_split, render, strip_tool_prefix, tokenize,
};
use crate::core::types::RepositorySnapshot;
use crate::io::executor::{CommandExecutor, RepositoryInspector};
use crate::io::process::{CommandOutput, run_command_with_timeout};

pub const NO_COMMITS: &str = "No commits yet.";
pub const NO_REMOTES: &str = "No remotes configured.";
pub const NO_REMOTE_BRANCHES: &str = "No remote branches.";
pub const NO_DIFF: &str = "No unstaged changes.";
pub const NO_UNPUSHED: &str = "No unpushed commits.";
pub const NO_UPSTREAM: &str = "No upstream configured for the current branch; unpushed commits unknown.";

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    log_entries: u32,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            output_limit_bytes,
            log_entries: 5,
        }
    }

    pub fn with_log_entries(mut self, entries: u32) -> Self {
        self.log_entries = entries.max(1);
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Absolute `.git` directory, or an error outside a repository.
    #[instrument(skip_all)]
    pub fn git_dir(&self) -> Result<PathBuf> {
        let out = self.run(&["rev-parse", "--absolute-git-dir"])?;
        if !out.success() {
            return Err(anyhow!("not a git repository: {}", out.stderr_text()));
        }
        let dir = PathBuf::from(out.stdout_text());
        debug!(git_dir = %dir.display(), "resolved git dir");
        Ok(dir)
    }

    /// `git config --global <key>`, if set.
    pub fn global_config(&self, key: &str) -> Option<String> {
        let out = self.run(&["config", "--global", key]).ok()?;
        let value = out.stdout_text();
        (out.success() && !value.is_empty()).then_some(value)
    }

    fn command(&self, args: &[impl AsRef<std::ffi::OsStr>]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true")
            .env("GIT_PAGER", "cat")
            .env("LC_ALL", "C");
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        run_command_with_timeout(self.command(args), self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run git {}", args.join(" ")))
    }

    /// Run and render as text: stdout (or stderr when stdout is empty) on
    /// success, `Error: ...` otherwise.
    fn run_text(&self, args: &[String]) -> String {
        let rendered = render(args);
        let output = match run_command_with_timeout(
            self.command(args),
            self.timeout,
            self.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(command = %rendered, err = %err, "git could not be run");
                return format!("Error: failed to run git {rendered}: {err:#}");
            }
        };
        if output.timed_out {
            return format!(
                "Error: Command timed out after {}s: git {rendered}",
                self.timeout.as_secs()
            );
        }
        let stdout = output.stdout_text();
        let stderr = output.stderr_text();
        if output.success() {
            if stdout.is_empty() { stderr } else { stdout }
        } else {
            let detail = if stderr.is_empty() { stdout } else { stderr };
            format!("Error: {detail}")
        }
    }

    fn query(&self, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.run_text(&args)
    }

    fn recent_commits(&self) -> String {
        let count = format!("-{}", self.log_entries);
        let out = self.query(&["log", &count, "--oneline"]);
        if out.contains("does not have any commits yet") {
            NO_COMMITS.to_string()
        } else {
            out
        }
    }

    fn unpushed_commits(&self) -> String {
        let upstream = self.query(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"]);
        if upstream.starts_with("Error:") || upstream.is_empty() {
            return NO_UPSTREAM.to_string();
        }
        let out = self.query(&["log", "@{u}..HEAD", "--oneline"]);
        if out.starts_with("Error:") {
            return NO_UPSTREAM.to_string();
        }
        or_placeholder(out, NO_UNPUSHED)
    }
}

fn or_placeholder(text: String, placeholder: &str) -> String {
    if text.trim().is_empty() {
        placeholder.to_string()
    } else {
        text
    }
}

impl RepositoryInspector for Git {
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    fn snapshot(&self) -> RepositorySnapshot {
        debug!("capturing repository snapshot");
        RepositorySnapshot {
            status: self.status(),
            branches: self.branches(),
            remote_branches: or_placeholder(self.query(&["branch", "-r"]), NO_REMOTE_BRANCHES),
            recent_commits: self.recent_commits(),
            diff_stat: or_placeholder(self.query(&["diff", "--stat"]), NO_DIFF),
            unpushed_commits: self.unpushed_commits(),
            remotes: or_placeholder(self.query(&["remote", "-v"]), NO_REMOTES),
        }
    }

    fn branches(&self) -> String {
        self.query(&["branch"])
    }

    fn status(&self) -> String {
        self.query(&["status"])
    }
}

impl CommandExecutor for Git {
    #[instrument(skip_all, fields(command = raw_command))]
    fn execute(&self, raw_command: &str) -> String {
        let stripped = strip_tool_prefix(raw_command);
        let args = tokenize(stripped).unwrap_or_else(|err| {
            warn!(err = %err, "tokenize failed, splitting on whitespace");
            naive_split(stripped)
        });
        if args.is_empty() {
            return "Error: empty command".to_string();
        }
        let args = inject_safety_flags(args);
        debug!(args = %render(&args), "executing git command");
        self.run_text(&args)
    }
}
