//! Keyword-level reading of the user's request.
//!
//! Keywords match at word starts, so `unstage` does not count as `stage` and
//! `readd` does not count as `add`. Classification is heuristic: when more than
//! one multi-step pattern fits, the first in priority order wins and the
//! others are reported so callers can flag the ambiguity.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::context::WorkflowContext;

/// Verbs that make a request an action request rather than a question.
pub const ACTION_KEYWORDS: &[&str] = &[
    "unstage", "stage", "commit", "push", "create", "delete", "checkout", "switch", "merge",
    "rebase", "add", "remove",
];

/// Operations counted by the generic continuation rule.
pub const OPERATION_KEYWORDS: &[&str] = &[
    "switch",
    "checkout",
    "pull",
    "push",
    "merge",
    "rebase",
    "create",
    "delete",
    "add",
    "stage",
    "commit",
    "unstage",
    "stash",
    "reset",
    "cherry-pick",
    "tag",
    "fetch",
];

/// Fallback branch name when a create-branch request names none.
pub const DEFAULT_NEW_BRANCH: &str = "new-branch";

static BRANCH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"branch\s+(?:named\s+)?(?:with name\s+)?([^\s]+)").expect("branch name regex")
});

/// True if `keyword` occurs in `text` at the start of a word (case-insensitive).
pub fn mentions(text: &str, keyword: &str) -> bool {
    let haystack = text.to_lowercase();
    let needle = keyword.to_lowercase();
    haystack.match_indices(&needle).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .is_none_or(|prev| !prev.is_alphanumeric())
    })
}

pub fn is_action_request(query: &str) -> bool {
    ACTION_KEYWORDS.iter().any(|kw| mentions(query, kw))
}

/// Distinct operation keywords mentioned in the request, in keyword order.
pub fn mentioned_operations(query: &str) -> Vec<&'static str> {
    OPERATION_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| mentions(query, kw))
        .collect()
}

/// "delete current branch" / "delete this branch".
pub fn deletes_current_branch(query: &str) -> bool {
    let lower = query.to_lowercase();
    mentions(&lower, "delete") && (lower.contains("current branch") || lower.contains("this branch"))
}

pub fn creates_branch(query: &str) -> bool {
    mentions(query, "create") && mentions(query, "branch")
}

pub fn unstages(query: &str) -> bool {
    mentions(query, "unstage")
}

/// Branch name following "branch", "branch named" or "branch with name".
pub fn requested_branch_name(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    BRANCH_NAME_RE
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ',' | '.'))
                .to_string()
        })
        .filter(|name| !name.is_empty())
}

/// Seed first-step facts from the request text.
///
/// The branch to delete is the branch captured when the session was created,
/// not whatever is checked out now.
pub fn seed_context(context: &mut WorkflowContext, query: &str, original_branch: &str) {
    if deletes_current_branch(query) {
        context.target_branch_to_delete = Some(original_branch.to_string());
        context.delete_current_branch = Some(true);
    }
    if creates_branch(query)
        && let Some(name) = requested_branch_name(query)
    {
        context.new_branch_name = Some(name);
    }
}

/// Known multi-step request shapes, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPattern {
    SwitchPullMerge,
    PullMerge,
    StageCommit { push: bool },
    CreateBranch,
    DeleteCurrentBranch,
}

impl WorkflowPattern {
    pub fn label(self) -> &'static str {
        match self {
            Self::SwitchPullMerge => "switch+pull+merge",
            Self::PullMerge => "pull+merge",
            Self::StageCommit { push: false } => "stage+commit",
            Self::StageCommit { push: true } => "stage+commit+push",
            Self::CreateBranch => "create-branch",
            Self::DeleteCurrentBranch => "delete-current-branch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub pattern: Option<WorkflowPattern>,
    /// Lower-priority patterns that also matched.
    pub also_matched: Vec<WorkflowPattern>,
}

impl Classification {
    pub fn is_ambiguous(&self) -> bool {
        !self.also_matched.is_empty()
    }
}

pub fn classify(query: &str, context: &WorkflowContext) -> Classification {
    let has = |kw: &str| mentions(query, kw);
    let mut matched = Vec::new();

    if (has("switch") || has("checkout")) && has("pull") && has("merge") {
        matched.push(WorkflowPattern::SwitchPullMerge);
    }
    if has("pull") && has("merge") {
        matched.push(WorkflowPattern::PullMerge);
    }
    if (has("stage") || has("add")) && has("commit") {
        matched.push(WorkflowPattern::StageCommit { push: has("push") });
    }
    if creates_branch(query) {
        matched.push(WorkflowPattern::CreateBranch);
    }
    if WorkflowContext::flag(context.delete_current_branch) || deletes_current_branch(query) {
        matched.push(WorkflowPattern::DeleteCurrentBranch);
    }

    // switch+pull+merge always implies pull+merge; that overlap is not ambiguity.
    if matched.first() == Some(&WorkflowPattern::SwitchPullMerge) {
        matched.retain(|p| *p != WorkflowPattern::PullMerge);
    }

    let mut iter = matched.into_iter();
    Classification {
        pattern: iter.next(),
        also_matched: iter.collect(),
    }
}

/// True for requests that only ask to keep going.
pub fn is_continuation_request(query: &str) -> bool {
    matches!(query.trim().to_lowercase().as_str(), "continue" | "resume")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_at_word_start_only() {
        assert!(mentions("Stage my files", "stage"));
        assert!(!mentions("unstage changes", "stage"));
        assert!(mentions("unstage changes", "unstage"));
        assert!(mentions("cherry-pick abc", "cherry-pick"));
        assert!(!mentions("readd it", "add"));
    }

    #[test]
    fn action_vs_question() {
        assert!(is_action_request("please commit everything"));
        assert!(!is_action_request("what is the status of my repo?"));
    }

    #[test]
    fn unstage_request_mentions_one_operation() {
        assert_eq!(mentioned_operations("unstage changes"), vec!["unstage"]);
        assert_eq!(
            mentioned_operations("stage and commit and push"),
            vec!["push", "stage", "commit"]
        );
    }

    #[test]
    fn branch_name_extraction() {
        assert_eq!(
            requested_branch_name("create a branch named feature-x").as_deref(),
            Some("feature-x")
        );
        assert_eq!(
            requested_branch_name("Create branch with name Hotfix.").as_deref(),
            Some("hotfix")
        );
        assert_eq!(requested_branch_name("create something"), None);
    }

    #[test]
    fn seeding_binds_delete_target_to_original_branch() {
        let mut ctx = WorkflowContext::default();
        seed_context(&mut ctx, "delete current branch", "feature");
        assert_eq!(ctx.target_branch_to_delete.as_deref(), Some("feature"));
        assert_eq!(ctx.delete_current_branch, Some(true));

        let mut ctx = WorkflowContext::default();
        seed_context(&mut ctx, "create branch named api-v2", "main");
        assert_eq!(ctx.new_branch_name.as_deref(), Some("api-v2"));
        assert_eq!(ctx.target_branch_to_delete, None);
    }

    #[test]
    fn classification_priority_and_ambiguity() {
        let ctx = WorkflowContext::default();

        let c = classify("switch to main, pull latest and merge into feature", &ctx);
        assert_eq!(c.pattern, Some(WorkflowPattern::SwitchPullMerge));
        assert!(!c.is_ambiguous());

        let c = classify("stage, commit and push", &ctx);
        assert_eq!(c.pattern, Some(WorkflowPattern::StageCommit { push: true }));

        let c = classify("pull, merge main, then add and commit the fix", &ctx);
        assert_eq!(c.pattern, Some(WorkflowPattern::PullMerge));
        assert_eq!(
            c.also_matched,
            vec![WorkflowPattern::StageCommit { push: false }]
        );

        assert_eq!(classify("unstage changes", &ctx).pattern, None);
    }

    #[test]
    fn delete_pattern_follows_context_flag() {
        let ctx = WorkflowContext {
            delete_current_branch: Some(true),
            ..WorkflowContext::default()
        };
        let c = classify("show the log", &ctx);
        assert_eq!(c.pattern, Some(WorkflowPattern::DeleteCurrentBranch));
    }

    #[test]
    fn bare_continue_is_not_a_new_request() {
        assert!(is_continuation_request(" Continue "));
        assert!(is_continuation_request("resume"));
        assert!(!is_continuation_request("continue and push"));
    }
}
