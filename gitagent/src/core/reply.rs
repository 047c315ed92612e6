//! Oracle reply parsing, sanitizing and the deterministic fallback ladder.
//!
//! Replies are untrusted free text expected to contain one JSON object. The
//! first well-formed object wins; prose around it is ignored.

use serde_json::{Map, Value};

use crate::core::branch::{CurrentBranch, current_branch, safe_branch};
use crate::core::command::{split_args, subcommand, subcommand_args};
use crate::core::intent::{
    DEFAULT_NEW_BRANCH, creates_branch, is_action_request, requested_branch_name, unstages,
};
use crate::core::types::{Action, ActionKind};

/// Reasoning used when a reply object carries none.
pub const DEFAULT_REASONING: &str = "Generated from response";

/// Return the first JSON object embedded in `text`.
pub fn extract_first_object(text: &str) -> Option<Map<String, Value>> {
    for (idx, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }
    None
}

/// Build an [`Action`] from a reply object, filling missing fields with safe defaults.
///
/// A missing or unknown `action_type` becomes `provide_info`. Probes are read
/// from `verification_commands` (or `verification_probes`).
pub fn action_from_object(map: &Map<String, Value>) -> Action {
    let text = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };
    let kind = map
        .get("action_type")
        .and_then(Value::as_str)
        .and_then(ActionKind::parse)
        .unwrap_or(ActionKind::ProvideInfo);
    let reasoning = match text("reasoning") {
        r if r.is_empty() => DEFAULT_REASONING.to_string(),
        r => r,
    };
    let probes = map
        .get("verification_commands")
        .or_else(|| map.get("verification_probes"))
        .map(probe_list)
        .unwrap_or_default();

    Action {
        kind,
        command: text("command"),
        reasoning,
        expected_outcome: text("expected_outcome"),
        verification_probes: probes,
    }
}

fn probe_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse a reply into an action; `None` when no object can be recovered.
pub fn parse_reply(text: &str) -> Option<Action> {
    extract_first_object(text).map(|map| action_from_object(&map))
}

/// Deterministic action for a first-step action request.
pub fn step_zero_heuristic(query: &str) -> Action {
    if unstages(query) {
        return Action::run(
            "reset HEAD .",
            "Unstaging all staged changes as requested",
            "All staged changes will be unstaged",
            &["status"],
        );
    }
    if creates_branch(query) {
        let name = requested_branch_name(query).unwrap_or_else(|| DEFAULT_NEW_BRANCH.to_string());
        return Action::run(
            format!("checkout -b {name}"),
            format!("Creating new branch {name} as requested"),
            format!("New branch {name} will be created and checked out"),
            &["branch"],
        );
    }
    Action::run(
        "status",
        "Checking repository status to determine next action",
        "Repository status will be displayed",
        &[],
    )
}

/// Action used when the reply held no structured data.
///
/// First-step action requests get a keyword heuristic; everything else echoes
/// the raw reply as an informational answer.
pub fn fallback_action(query: &str, step: u32, raw_reply: &str) -> Action {
    if step == 0 && is_action_request(query) {
        step_zero_heuristic(query)
    } else {
        Action::provide_info(raw_reply.trim())
    }
}

/// Action requests on the first step must run a command.
pub fn enforce_step_zero(action: Action, query: &str, step: u32) -> Action {
    let runs_command = action.kind == ActionKind::RunCommand && !action.command.trim().is_empty();
    if step == 0 && is_action_request(query) && !runs_command {
        step_zero_heuristic(query)
    } else {
        action
    }
}

/// Rewrite a proposal to delete the checked-out branch.
///
/// The result moves to a safe branch first (`main`, `master`, else another
/// local branch) or, with nowhere to go, explains why nothing can run.
pub fn guard_branch_delete(action: Action, branch_listing: &str) -> Action {
    if action.kind != ActionKind::RunCommand {
        return action;
    }
    let CurrentBranch::Named(current) = current_branch(branch_listing) else {
        return action;
    };
    let args = split_args(&action.command);
    if subcommand(&args) != Some("branch") {
        return action;
    }
    let rest = subcommand_args(&args);
    let deletes = rest
        .iter()
        .any(|a| matches!(a.as_str(), "-d" | "-D" | "--delete"));
    let targets_current = rest.iter().any(|a| !a.starts_with('-') && *a == current);
    if !deletes || !targets_current {
        return action;
    }

    match safe_branch(branch_listing, &current) {
        Some(target) => Action::run(
            format!("checkout {target}"),
            format!(
                "Cannot delete '{current}' while it is checked out; switching to '{target}' first"
            ),
            format!("Branch '{target}' is checked out"),
            &["branch"],
        ),
        None => Action::provide_info(format!(
            "Cannot delete '{current}': it is checked out and no other local branch exists to switch to."
        )),
    }
}
