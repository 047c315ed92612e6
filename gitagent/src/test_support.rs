//! Test helpers: scratch repositories, scripted collaborators and fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;

use crate::core::types::{ExecutionHistoryEntry, RepositorySnapshot, Session, VerificationOutcome};
use crate::io::confirm::Confirmer;
use crate::io::git::Git;
use crate::io::oracle::{ChatTransport, Oracle, OracleUnavailable, TransportError};

/// A real git repository in a temp dir, on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Repository with one commit ("initial commit") adding `README.md`.
    pub fn new() -> Self {
        let repo = Self::empty();
        repo.write_file("README.md", "# scratch\n");
        repo.run(&["add", "README.md"]);
        repo.run(&["commit", "-m", "initial commit"]);
        repo
    }

    /// Initialized repository without commits.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Self { dir };
        repo.run(&["init", "-q"]);
        repo.run(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.run(&["config", "user.name", "Test User"]);
        repo.run(&["config", "user.email", "test@example.com"]);
        repo.run(&["config", "commit.gpgsign", "false"]);
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Adapter under test, pointed at this repository.
    pub fn git(&self) -> Git {
        Git::new(self.path(), Duration::from_secs(30), 100_000)
    }

    /// Run raw git for test setup; panics on failure and returns stdout.
    pub fn run(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn write_file(&self, name: &str, contents: &str) {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, contents).expect("write file");
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Oracle replaying canned replies in order; unavailable once the script runs out.
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<Result<String, OracleUnavailable>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<Result<String, OracleUnavailable>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Every call fails, as when all credentials are exhausted.
    pub fn unavailable() -> Self {
        Self::new(Vec::new())
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleUnavailable> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(OracleUnavailable::new("all API keys are exhausted")))
    }
}

/// Confirmer answering from scripts; falls back to each prompt's default.
#[derive(Default)]
pub struct ScriptedConfirmer {
    confirmations: RefCell<VecDeque<bool>>,
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn new(confirmations: Vec<bool>) -> Self {
        Self {
            confirmations: RefCell::new(confirmations.into()),
            ..Self::default()
        }
    }

    pub fn with_answers(answers: Vec<&str>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().map(str::to_string).collect()),
            ..Self::default()
        }
    }

    /// Prompt texts shown so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        self.asked.borrow_mut().push(prompt.to_string());
        self.confirmations.borrow_mut().pop_front().unwrap_or(default)
    }

    fn ask(&self, prompt: &str, default: Option<&str>) -> Option<String> {
        self.asked.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .or_else(|| default.map(str::to_string))
    }
}

/// One request seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    pub url: String,
    pub api_key: String,
    pub body: String,
}

pub struct ScriptedTransport {
    responses: RefCell<VecDeque<Result<String, TransportError>>>,
    calls: RefCell<Vec<TransportCall>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<String, TransportError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.borrow().clone()
    }
}

impl ChatTransport for ScriptedTransport {
    fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &str,
        _timeout: Duration,
    ) -> Result<String, TransportError> {
        self.calls.borrow_mut().push(TransportCall {
            url: url.to_string(),
            api_key: api_key.to_string(),
            body: body.to_string(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".to_string())))
    }
}

/// Fresh active session on `main`.
pub fn sample_session(id: &str) -> Session {
    Session::new(id, "2024-01-01T00:00:00Z", "stage and commit my changes", "main")
}

/// History entry; failed entries carry one issue.
pub fn history_entry(step: u32, command: &str, success: bool) -> ExecutionHistoryEntry {
    let issues = if success {
        Vec::new()
    } else {
        vec![format!("Command 'git {command}' failed: Error: simulated")]
    };
    ExecutionHistoryEntry {
        step,
        command: command.to_string(),
        reasoning: format!("run {command}"),
        expected_outcome: "it works".to_string(),
        raw_output: String::new(),
        verification_outcome: VerificationOutcome {
            success,
            evidence: Default::default(),
            issues,
        },
        timestamp: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// Snapshot of a small repository on `main` with one modified file.
pub fn sample_snapshot() -> RepositorySnapshot {
    RepositorySnapshot {
        status: "On branch main\nChanges not staged for commit:\n\tmodified:   src/lib.rs\n"
            .to_string(),
        branches: "  feature\n* main\n".to_string(),
        remote_branches: "  origin/main\n".to_string(),
        recent_commits: "a1b2c3d initial commit\n".to_string(),
        diff_stat: " src/lib.rs | 2 +-\n 1 file changed, 1 insertion(+), 1 deletion(-)\n"
            .to_string(),
        unpushed_commits: "No unpushed commits.".to_string(),
        remotes: "origin\thttps://example.invalid/repo.git (fetch)\n".to_string(),
    }
}
