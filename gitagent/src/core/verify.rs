//! Semantic success checks for executed commands.
//!
//! Exit status alone is not trusted. Each command category has its own
//! criterion evaluated against repository state read after the command ran.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::branch::{branch_names, current_branch};
use crate::core::command::{split_args, subcommand, subcommand_args};
use crate::core::types::VerificationOutcome;

/// Evidence value for probes refused by the read-only policy.
pub const SKIPPED_PROBE: &str = "skipped: not a read-only command";

const STAGED_MARKER: &str = "Changes to be committed:";
const AHEAD_MARKER: &str = "Your branch is ahead of";

// `[main 1a2b3c4] message` or `[main (root-commit) 1a2b3c4] message`
static COMMIT_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[[^\]\s]+(?: \([^)]*\))? [0-9a-f]{4,}\]").expect("commit summary regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandCategory {
    BranchDelete { names: Vec<String> },
    Switch { target: Option<String> },
    Stage,
    Unstage,
    Commit,
    Push,
    Other,
}

impl CommandCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BranchDelete { .. } => "branch-delete",
            Self::Switch { .. } => "switch",
            Self::Stage => "stage",
            Self::Unstage => "unstage",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::Other => "other",
        }
    }
}

pub fn categorize(command: &str) -> CommandCategory {
    let args = split_args(command);
    let rest: Vec<&str> = subcommand_args(&args).iter().map(String::as_str).collect();
    let positional = || -> Vec<String> {
        rest.iter()
            .filter(|a| !a.starts_with('-'))
            .map(|a| (*a).to_string())
            .collect()
    };

    match subcommand(&args) {
        Some("branch") if rest.iter().any(|a| matches!(*a, "-d" | "-D" | "--delete")) => {
            CommandCategory::BranchDelete { names: positional() }
        }
        Some("checkout" | "switch") => {
            if rest.contains(&"--") {
                return CommandCategory::Other;
            }
            let create_flag = rest
                .iter()
                .position(|a| matches!(*a, "-b" | "-B" | "-c" | "-C" | "--create"));
            let target = match create_flag {
                Some(idx) => rest.get(idx + 1).map(|s| (*s).to_string()),
                None => positional().pop(),
            };
            CommandCategory::Switch { target }
        }
        Some("add") => CommandCategory::Stage,
        Some("restore") if rest.contains(&"--staged") => CommandCategory::Unstage,
        Some("reset") if !rest.iter().any(|a| matches!(*a, "--hard" | "--soft")) => {
            CommandCategory::Unstage
        }
        Some("commit") => CommandCategory::Commit,
        Some("push") => CommandCategory::Push,
        _ => CommandCategory::Other,
    }
}

/// Repository state read after the command and its probes ran.
#[derive(Debug, Clone, Default)]
pub struct PostState {
    pub branches: String,
    pub status: String,
}

/// Issue for a command whose own output is an executor error.
pub fn command_output_issue(command: &str, output: &str) -> Option<String> {
    let trimmed = output.trim_start();
    trimmed.starts_with("Error:").then(|| {
        let first_line = trimmed.lines().next().unwrap_or(trimmed);
        format!("Command 'git {command}' failed: {first_line}")
    })
}

/// Generic failure-marker check over probe outputs.
pub fn probe_issues(evidence: &BTreeMap<String, String>) -> Vec<String> {
    evidence
        .iter()
        .filter(|(_, output)| output.as_str() != SKIPPED_PROBE)
        .filter(|(_, output)| {
            let lower = output.to_lowercase();
            lower.contains("error") || lower.contains("fatal")
        })
        .map(|(probe, output)| {
            format!("Verification command '{probe}' returned error: {}", output.trim())
        })
        .collect()
}

/// Command-specific checks.
pub fn semantic_issues(
    category: &CommandCategory,
    command_output: &str,
    post: &PostState,
    evidence: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut issues = Vec::new();
    match category {
        CommandCategory::BranchDelete { names } => {
            let remaining = branch_names(&post.branches);
            for name in names {
                if remaining.iter().any(|b| b == name) {
                    issues.push(format!("Branch {name} still exists after deletion attempt"));
                }
            }
        }
        CommandCategory::Switch { target: Some(target) } => {
            let current = current_branch(&post.branches);
            // A commit or tag target leaves HEAD detached; only branches are checked.
            let is_branch = branch_names(&post.branches).iter().any(|b| b == target);
            if is_branch && !current.is(target) {
                issues.push(format!(
                    "Expected to be on branch {target}, but on {current}"
                ));
            }
        }
        CommandCategory::Switch { target: None } | CommandCategory::Other => {}
        CommandCategory::Stage => {
            if !post.status.contains(STAGED_MARKER) && !post.status.contains("nothing to commit") {
                issues.push("Files were not properly staged".to_string());
            }
        }
        CommandCategory::Unstage => {
            if post.status.contains(STAGED_MARKER) {
                issues.push("Changes are still staged after unstaging".to_string());
            }
        }
        CommandCategory::Commit => {
            if post.status.contains(STAGED_MARKER) {
                issues.push("Commit failed - changes are still staged".to_string());
            } else if !commit_evidence(command_output, post, evidence) {
                issues.push("Unable to verify commit was created".to_string());
            }
        }
        CommandCategory::Push => {
            if post.status.contains(AHEAD_MARKER) {
                issues.push("Push failed - branch is still ahead of remote".to_string());
            }
        }
    }
    issues
}

fn commit_evidence(
    command_output: &str,
    post: &PostState,
    evidence: &BTreeMap<String, String>,
) -> bool {
    if post.status.contains("nothing to commit, working tree clean")
        || post.status.contains(AHEAD_MARKER)
        || COMMIT_SUMMARY_RE.is_match(command_output)
    {
        return true;
    }
    evidence.iter().any(|(probe, output)| {
        matches!(subcommand(&split_args(probe)), Some("log" | "show"))
            && !output.trim_start().starts_with("Error:")
            && output.contains("commit")
    })
}

/// Combine every check into one outcome; success requires all of them to pass.
pub fn assemble(
    command: &str,
    command_output: &str,
    evidence: BTreeMap<String, String>,
    post: &PostState,
) -> VerificationOutcome {
    let category = categorize(command);
    let mut issues = Vec::new();
    issues.extend(command_output_issue(command, command_output));
    issues.extend(probe_issues(&evidence));
    issues.extend(semantic_issues(&category, command_output, post, &evidence));
    VerificationOutcome {
        success: issues.is_empty(),
        evidence,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(branches: &str, status: &str) -> PostState {
        PostState {
            branches: branches.to_string(),
            status: status.to_string(),
        }
    }

    const CLEAN: &str = "On branch main\nnothing to commit, working tree clean";

    #[test]
    fn categorizes_by_subcommand() {
        assert_eq!(
            categorize("branch -D feature"),
            CommandCategory::BranchDelete {
                names: vec!["feature".to_string()]
            }
        );
        assert_eq!(
            categorize("git checkout -b login"),
            CommandCategory::Switch {
                target: Some("login".to_string())
            }
        );
        assert_eq!(
            categorize("switch main"),
            CommandCategory::Switch {
                target: Some("main".to_string())
            }
        );
        assert_eq!(categorize("checkout -- src/lib.rs"), CommandCategory::Other);
        assert_eq!(categorize("reset HEAD ."), CommandCategory::Unstage);
        assert_eq!(categorize("reset --hard HEAD~1"), CommandCategory::Other);
        assert_eq!(categorize("restore --staged ."), CommandCategory::Unstage);
        assert_eq!(categorize("commit -m \"add login\""), CommandCategory::Commit);
        assert_eq!(categorize("stash"), CommandCategory::Other);
    }

    #[test]
    fn deleted_branch_still_listed_fails_with_its_name() {
        let outcome = assemble(
            "branch -D feature",
            "",
            BTreeMap::new(),
            &post("* main\n  feature", CLEAN),
        );
        assert!(!outcome.success);
        assert!(outcome.issues.iter().any(|i| i.contains("feature")));

        let outcome = assemble(
            "branch -D feature",
            "Deleted branch feature (was 1a2b3c4).",
            BTreeMap::new(),
            &post("* main\n  feature-2", CLEAN),
        );
        assert!(outcome.success, "{:?}", outcome.issues);
    }

    #[test]
    fn switch_checks_current_branch() {
        let ok = assemble("checkout main", "", BTreeMap::new(), &post("* main\n  dev", CLEAN));
        assert!(ok.success);

        let bad = assemble("checkout main", "", BTreeMap::new(), &post("  main\n* dev", CLEAN));
        assert!(!bad.success);
        assert_eq!(bad.issues, vec!["Expected to be on branch main, but on dev"]);
    }

    #[test]
    fn checking_out_a_tag_is_not_a_branch_switch() {
        let detached = "* (HEAD detached at v1.0)\n  main";
        let outcome = assemble(
            "checkout v1.0",
            "HEAD is now at 1a2b3c4 release",
            BTreeMap::new(),
            &post(detached, "HEAD detached at v1.0\nnothing to commit, working tree clean"),
        );
        assert!(outcome.success, "{:?}", outcome.issues);
    }

    #[test]
    fn stage_and_unstage_read_status() {
        let staged = "On branch main\nChanges to be committed:\n\tmodified: a.txt";
        let unstaged = "On branch main\nChanges not staged for commit:\n\tmodified: a.txt";

        assert!(assemble("add .", "", BTreeMap::new(), &post("* main", staged)).success);
        assert!(!assemble("add .", "", BTreeMap::new(), &post("* main", unstaged)).success);

        assert!(assemble("reset HEAD .", "", BTreeMap::new(), &post("* main", unstaged)).success);
        assert!(!assemble("reset HEAD .", "", BTreeMap::new(), &post("* main", staged)).success);
    }

    #[test]
    fn commit_requires_positive_evidence() {
        let untracked = "On branch main\nUntracked files:\n\tscratch.txt\n\nnothing added to commit but untracked files present";

        let summary = assemble(
            "commit -m wip",
            "[main 4f2c1e9] wip\n 1 file changed",
            BTreeMap::new(),
            &post("* main", untracked),
        );
        assert!(summary.success, "{:?}", summary.issues);

        let none = assemble("commit -m wip", "", BTreeMap::new(), &post("* main", untracked));
        assert!(!none.success);
        assert_eq!(none.issues, vec!["Unable to verify commit was created"]);

        let mut evidence = BTreeMap::new();
        evidence.insert("log -1".to_string(), "commit 4f2c1e9\nAuthor: a".to_string());
        assert!(assemble("commit -m wip", "", evidence, &post("* main", untracked)).success);

        let still_staged = "On branch main\nChanges to be committed:\n\tnew file: b";
        let outcome = assemble("commit -m wip", "", BTreeMap::new(), &post("* main", still_staged));
        assert_eq!(outcome.issues, vec!["Commit failed - changes are still staged"]);
    }

    #[test]
    fn push_fails_while_ahead() {
        let ahead = "On branch main\nYour branch is ahead of 'origin/main' by 1 commit.";
        assert!(!assemble("push", "", BTreeMap::new(), &post("* main", ahead)).success);

        let synced = "On branch main\nYour branch is up to date with 'origin/main'.";
        assert!(assemble("push", "", BTreeMap::new(), &post("* main", synced)).success);
    }

    #[test]
    fn every_issue_is_accumulated() {
        let mut evidence = BTreeMap::new();
        evidence.insert("branch".to_string(), "fatal: not a git repository".to_string());
        evidence.insert("push origin x".to_string(), SKIPPED_PROBE.to_string());
        let outcome = assemble(
            "branch -d feature",
            "Error: error: branch 'feature' not found.",
            evidence,
            &post("* main\n  feature", CLEAN),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.issues.len(), 3, "{:?}", outcome.issues);
        assert!(outcome.issues[0].starts_with("Command 'git branch -d feature' failed"));
    }
}
