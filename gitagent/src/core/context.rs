//! Workflow-context facts: the session's working memory.
//!
//! Known facts are typed fields; unknown keys found in a session record are
//! kept in `extra` so they round-trip unchanged. Facts are only ever set or
//! refined, never cleared.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::command::{split_args, subcommand, subcommand_args};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Branch the request asked to delete, bound to the session's original branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch_to_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_current_branch: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_branch_created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_staged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_unstaged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_committed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_pushed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_deleted: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WorkflowContext {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn flag(value: Option<bool>) -> bool {
        value.unwrap_or(false)
    }

    /// Record the effect of a command whose verification passed.
    pub fn record_command(&mut self, command: &str) {
        let args = split_args(command);
        let rest: Vec<&str> = subcommand_args(&args).iter().map(String::as_str).collect();
        match subcommand(&args) {
            Some("branch") if rest.iter().any(|a| matches!(*a, "-d" | "-D" | "--delete")) => {
                // With a recorded target, only deleting that branch counts.
                let removes = |name: &str| rest.iter().any(|a| !a.starts_with('-') && *a == name);
                if self.target_branch_to_delete.as_deref().is_none_or(removes) {
                    self.branch_deleted = Some(true);
                }
            }
            Some("checkout") if rest.iter().any(|a| matches!(*a, "-b" | "-B")) => {
                self.mark_branch_created(&rest, &["-b", "-B"]);
            }
            Some("switch") if rest.iter().any(|a| matches!(*a, "-c" | "-C" | "--create")) => {
                self.mark_branch_created(&rest, &["-c", "-C", "--create"]);
            }
            Some("add") => self.changes_staged = Some(true),
            Some("restore") if rest.contains(&"--staged") => self.changes_unstaged = Some(true),
            Some("reset") if !rest.iter().any(|a| matches!(*a, "--hard" | "--soft")) => {
                self.changes_unstaged = Some(true);
            }
            Some("commit") => self.changes_committed = Some(true),
            Some("push") => self.changes_pushed = Some(true),
            _ => {}
        }
    }

    fn mark_branch_created(&mut self, rest: &[&str], flags: &[&str]) {
        self.new_branch_created = Some(true);
        if self.new_branch_name.is_none() {
            let name = rest
                .iter()
                .position(|a| flags.contains(a))
                .and_then(|idx| rest.get(idx + 1));
            if let Some(name) = name {
                self.new_branch_name = Some((*name).to_string());
            }
        }
    }

    /// One `key: value` line per fact, for prompts.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut push = |key: &str, value: String| lines.push(format!("{key}: {value}"));
        if let Some(v) = &self.target_branch_to_delete {
            push("target_branch_to_delete", v.clone());
        }
        if let Some(v) = self.delete_current_branch {
            push("delete_current_branch", v.to_string());
        }
        if let Some(v) = &self.new_branch_name {
            push("new_branch_name", v.clone());
        }
        if let Some(v) = self.new_branch_created {
            push("new_branch_created", v.to_string());
        }
        if let Some(v) = self.changes_staged {
            push("changes_staged", v.to_string());
        }
        if let Some(v) = self.changes_unstaged {
            push("changes_unstaged", v.to_string());
        }
        if let Some(v) = self.changes_committed {
            push("changes_committed", v.to_string());
        }
        if let Some(v) = self.changes_pushed {
            push("changes_pushed", v.to_string());
        }
        if let Some(v) = self.branch_deleted {
            push("branch_deleted", v.to_string());
        }
        for (key, value) in &self.extra {
            push(key, value.to_string());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_facts_from_verified_commands() {
        let mut ctx = WorkflowContext::default();
        ctx.record_command("add .");
        ctx.record_command("git commit -m \"wip\"");
        ctx.record_command("push origin main");
        assert_eq!(ctx.changes_staged, Some(true));
        assert_eq!(ctx.changes_committed, Some(true));
        assert_eq!(ctx.changes_pushed, Some(true));
        assert_eq!(ctx.branch_deleted, None);
    }

    #[test]
    fn deleting_another_branch_does_not_satisfy_the_target() {
        let mut ctx = WorkflowContext {
            target_branch_to_delete: Some("feature".to_string()),
            ..WorkflowContext::default()
        };
        ctx.record_command("branch -d stale");
        assert_eq!(ctx.branch_deleted, None);
        ctx.record_command("branch -D feature");
        assert_eq!(ctx.branch_deleted, Some(true));

        let mut ctx = WorkflowContext::default();
        ctx.record_command("branch --delete anything");
        assert_eq!(ctx.branch_deleted, Some(true));
    }

    #[test]
    fn branch_creation_records_the_name_once() {
        let mut ctx = WorkflowContext::default();
        ctx.record_command("checkout -b feature/login");
        assert_eq!(ctx.new_branch_created, Some(true));
        assert_eq!(ctx.new_branch_name.as_deref(), Some("feature/login"));

        ctx.record_command("switch -c other");
        assert_eq!(ctx.new_branch_name.as_deref(), Some("feature/login"));
    }

    #[test]
    fn unrelated_commands_never_clear_facts() {
        let mut ctx = WorkflowContext {
            branch_deleted: Some(true),
            ..WorkflowContext::default()
        };
        ctx.record_command("status");
        ctx.record_command("checkout main");
        assert_eq!(ctx.branch_deleted, Some(true));
    }

    #[test]
    fn unknown_keys_round_trip() {
        let json = r#"{"changes_staged":true,"reviewer":"sam","retries":2}"#;
        let ctx: WorkflowContext = serde_json::from_str(json).expect("parse");
        assert_eq!(ctx.changes_staged, Some(true));
        assert_eq!(ctx.extra.get("reviewer"), Some(&Value::from("sam")));

        let back: Value = serde_json::to_value(&ctx).expect("serialize");
        let original: Value = serde_json::from_str(json).expect("parse value");
        assert_eq!(back, original);
    }

    #[test]
    fn empty_context_serializes_to_empty_object() {
        let ctx = WorkflowContext::default();
        assert!(ctx.is_empty());
        assert_eq!(serde_json::to_string(&ctx).expect("serialize"), "{}");
    }
}
