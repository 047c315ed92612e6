//! Prompt rendering for the planner, info provider and responder.
//!
//! Templates carry `<!-- section:KEY required|droppable -->` markers. After
//! rendering, droppable sections are removed least-critical first until the
//! prompt fits the byte budget; if it still does not fit, the last section is
//! truncated.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::branch::current_branch;
use crate::core::types::{RepositorySnapshot, Session};

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const INFO_TEMPLATE: &str = include_str!("prompts/info.md");
const RESPONDER_TEMPLATE: &str = include_str!("prompts/responder.md");

/// Droppable sections, least critical first.
const DROP_ORDER: &[&str] = &[
    "remotes",
    "remote_branches",
    "unpushed",
    "diff",
    "commits",
    "history",
];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section marker regex")
});

/// One executed step as shown to the oracle.
#[derive(Debug, Clone, Serialize)]
struct HistoryLine {
    step: u32,
    command: String,
    ok: bool,
    issues: Vec<String>,
}

fn history_lines(session: &Session) -> Vec<HistoryLine> {
    session
        .execution_history
        .iter()
        .map(|entry| HistoryLine {
            step: entry.step,
            command: entry.command.clone(),
            ok: entry.verification_outcome.success,
            issues: entry.verification_outcome.issues.clone(),
        })
        .collect()
}

/// Plain-text execution summary, also used when the oracle is unavailable.
pub fn history_summary(session: &Session) -> String {
    if session.execution_history.is_empty() {
        return "No commands were executed in this session.".to_string();
    }
    let mut text = String::from("Execution Summary:\n");
    for entry in &session.execution_history {
        let mark = if entry.verification_outcome.success {
            "ok"
        } else {
            "FAILED"
        };
        text.push_str(&format!("[{mark}] Step {}: git {}\n", entry.step, entry.command));
        if !entry.verification_outcome.success && !entry.verification_outcome.issues.is_empty() {
            text.push_str(&format!(
                "   Issues: {}\n",
                entry.verification_outcome.issues.join(", ")
            ));
        }
    }
    text.trim_end().to_string()
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("info", INFO_TEMPLATE)
            .expect("info template should be valid");
        env.add_template("responder", RESPONDER_TEMPLATE)
            .expect("responder template should be valid");
        Self { env }
    }
}

/// Inputs for one planner prompt.
#[derive(Debug, Clone, Copy)]
pub struct PlannerInput<'a> {
    pub session: &'a Session,
    pub snapshot: &'a RepositorySnapshot,
    /// 0-based step index; shown 1-based.
    pub step: u32,
    pub action_request: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct InfoInput<'a> {
    pub session: &'a Session,
    pub snapshot: &'a RepositorySnapshot,
    pub query: &'a str,
    pub reasoning: &'a str,
}

/// Renders prompts within a byte budget.
pub struct PromptBuilder {
    engine: PromptEngine,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            engine: PromptEngine::new(),
            budget_bytes,
        }
    }

    pub fn planner(&self, input: &PlannerInput<'_>) -> Result<String> {
        let session = input.session;
        let snap = input.snapshot;
        let current = current_branch(&snap.branches).to_string();
        let branch_to_delete = session
            .workflow_context
            .target_branch_to_delete
            .clone()
            .unwrap_or_else(|| current.clone());
        let rendered = self.engine.env.get_template("planner")?.render(context! {
            session_id => &session.session_id,
            original_query => &session.original_query,
            additional_requests => &session.additional_requests,
            original_branch => &session.original_branch,
            step => input.step + 1,
            branch_to_delete => branch_to_delete,
            context_facts => session.workflow_context.summary_lines(),
            history => history_lines(session),
            action_request => input.action_request,
            current_branch => current,
            status => snap.status.trim(),
            branches => snap.branches.trim(),
            recent_commits => snap.recent_commits.trim(),
            diff_stat => snap.diff_stat.trim(),
            unpushed_commits => snap.unpushed_commits.trim(),
            remote_branches => snap.remote_branches.trim(),
            remotes => snap.remotes.trim(),
        })?;
        Ok(self.fit(&rendered))
    }

    pub fn info(&self, input: &InfoInput<'_>) -> Result<String> {
        let session = input.session;
        let snap = input.snapshot;
        let rendered = self.engine.env.get_template("info")?.render(context! {
            original_query => &session.original_query,
            query => input.query,
            reasoning => input.reasoning,
            history => history_lines(session),
            recent_commits => snap.recent_commits.trim(),
            diff_stat => snap.diff_stat.trim(),
            status => snap.status.trim(),
            branches => snap.branches.trim(),
        })?;
        Ok(self.fit(&rendered))
    }

    pub fn responder(&self, session: &Session, snapshot: &RepositorySnapshot) -> Result<String> {
        let rendered = self.engine.env.get_template("responder")?.render(context! {
            original_query => &session.original_query,
            additional_requests => &session.additional_requests,
            step_count => session.current_step,
            session_status => session.status.as_str(),
            history_summary => history_summary(session),
            recent_commits => snapshot.recent_commits.trim(),
            status => snapshot.status.trim(),
            branches => snapshot.branches.trim(),
        })?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(last) = sections.last_mut() else {
        return;
    };
    let other_len = total - last.content.len();
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    let marker = "\n[truncated]";
    let keep = floor_char_boundary(&last.content, allowed.saturating_sub(marker.len()));
    last.content.truncate(keep);
    if allowed > marker.len() {
        last.content.push_str(marker);
    }
    debug!(
        section = %last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{history_entry, sample_session, sample_snapshot};

    #[test]
    fn planner_prompt_carries_session_and_repository() {
        let mut session = sample_session("session_42");
        session.workflow_context.target_branch_to_delete = Some("feature".to_string());
        session.record(history_entry(1, "checkout main", true));
        session.record(history_entry(2, "branch -d feature", false));
        session.additional_requests.push("then push it".to_string());
        let snapshot = sample_snapshot();

        let prompt = PromptBuilder::new(50_000)
            .planner(&PlannerInput {
                session: &session,
                snapshot: &snapshot,
                step: 2,
                action_request: true,
            })
            .expect("render");

        assert!(prompt.contains("Session ID: session_42"));
        assert!(prompt.contains("Current step: 3"));
        assert!(prompt.contains("Follow-up request: then push it"));
        assert!(prompt.contains("Target branch to delete: feature"));
        assert!(prompt.contains("git branch -d feature (FAILED verification)"));
        assert!(prompt.contains("Current branch: main"));
        assert!(prompt.contains("\"action_type\""));
        assert!(!prompt.contains("<!-- section:"));
    }

    #[test]
    fn budget_drops_remotes_before_history() {
        let mut session = sample_session("session_1");
        session.record(history_entry(1, "add .", true));
        let mut snapshot = sample_snapshot();
        snapshot.remotes = "origin\thttps://example.invalid/repo.git (fetch)\n".repeat(200);
        snapshot.remote_branches = "  origin/topic\n".repeat(200);

        let prompt = PromptBuilder::new(4_500)
            .planner(&PlannerInput {
                session: &session,
                snapshot: &snapshot,
                step: 1,
                action_request: true,
            })
            .expect("render");

        assert!(!prompt.contains("<remotes>"));
        assert!(!prompt.contains("<remote_branches>"));
        assert!(prompt.contains("<history>"));
        assert!(prompt.contains("<instructions>"));
        assert!(prompt.contains("<repository>"));
    }

    #[test]
    fn oversized_required_section_is_truncated() {
        let session = sample_session("session_1");
        let mut snapshot = sample_snapshot();
        snapshot.status = "é".repeat(20_000);

        let prompt = PromptBuilder::new(3_000)
            .responder(&session, &snapshot)
            .expect("render");
        assert!(prompt.len() <= 3_000 + 16, "{}", prompt.len());
        assert!(prompt.ends_with("[truncated]"));
    }

    #[test]
    fn summary_lists_failures_with_issues() {
        let mut session = sample_session("session_1");
        session.record(history_entry(1, "add .", true));
        session.record(history_entry(2, "commit -m x", false));
        let summary = history_summary(&session);
        assert!(summary.contains("[ok] Step 1: git add ."));
        assert!(summary.contains("[FAILED] Step 2: git commit -m x"));
        assert!(summary.contains("Issues:"));

        assert_eq!(
            history_summary(&sample_session("empty")),
            "No commands were executed in this session."
        );
    }
}
