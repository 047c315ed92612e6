//! Decide whether a multi-step workflow needs another planning round.

use crate::core::command::{split_args, subcommand, subcommand_args};
use crate::core::context::WorkflowContext;
use crate::core::intent::{Classification, WorkflowPattern, classify, mentioned_operations};
use crate::core::types::{Action, ActionKind, Session, VerificationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

/// Everything the decider looked at, for logging and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub decision: Decision,
    pub classification: Classification,
    /// Sub-steps with no evidence yet.
    pub missing: Vec<&'static str>,
    pub last_failed: bool,
}

pub fn should_continue(
    session: &Session,
    last_action: &Action,
    last_verification: Option<&VerificationOutcome>,
    halted_by_user: bool,
) -> Decision {
    assess(session, last_action, last_verification, halted_by_user).decision
}

pub fn assess(
    session: &Session,
    last_action: &Action,
    last_verification: Option<&VerificationOutcome>,
    halted_by_user: bool,
) -> Assessment {
    let context = &session.workflow_context;
    let request = session.request_text();
    let classification = classify(&request, context);
    let stop = |classification| Assessment {
        decision: Decision::Stop,
        classification,
        missing: Vec::new(),
        last_failed: false,
    };

    if halted_by_user || last_action.kind != ActionKind::RunCommand {
        return stop(classification);
    }

    let verified = session.verified_commands();
    let ran = |names: &[&str]| verified.iter().any(|cmd| runs_subcommand(cmd, names));
    let mut missing = Vec::new();

    match classification.pattern {
        Some(WorkflowPattern::SwitchPullMerge) => {
            if !ran(&["checkout", "switch"]) {
                missing.push("switch");
            }
            if !ran(&["pull"]) {
                missing.push("pull");
            }
            if !ran(&["merge"]) {
                missing.push("merge");
            }
        }
        Some(WorkflowPattern::PullMerge) => {
            if !ran(&["pull"]) {
                missing.push("pull");
            }
            if !ran(&["merge"]) {
                missing.push("merge");
            }
        }
        Some(WorkflowPattern::StageCommit { push }) => {
            if !ran(&["add"]) && !WorkflowContext::flag(context.changes_staged) {
                missing.push("stage");
            }
            if !ran(&["commit"]) && !WorkflowContext::flag(context.changes_committed) {
                missing.push("commit");
            }
            if push && !ran(&["push"]) && !WorkflowContext::flag(context.changes_pushed) {
                missing.push("push");
            }
        }
        Some(WorkflowPattern::CreateBranch) => {
            let created = verified.iter().any(|cmd| creates_branch(cmd));
            if !created && !WorkflowContext::flag(context.new_branch_created) {
                missing.push("create-branch");
            }
        }
        Some(WorkflowPattern::DeleteCurrentBranch) => {
            if !WorkflowContext::flag(context.branch_deleted) {
                missing.push("delete-branch");
            }
        }
        None => {
            let needed = mentioned_operations(&request).len();
            if session.execution_history.len() < needed {
                missing.push("operations");
            }
        }
    }

    let last_failed = last_verification.is_some_and(|v| !v.success);
    let decision = if missing.is_empty() && !last_failed {
        Decision::Stop
    } else {
        Decision::Continue
    };
    Assessment {
        decision,
        classification,
        missing,
        last_failed,
    }
}

fn runs_subcommand(command: &str, names: &[&str]) -> bool {
    subcommand(&split_args(command)).is_some_and(|sub| names.contains(&sub))
}

fn creates_branch(command: &str) -> bool {
    let args = split_args(command);
    let rest = subcommand_args(&args);
    match subcommand(&args) {
        Some("checkout") => rest.iter().any(|a| a == "-b" || a == "-B"),
        Some("switch") => rest.iter().any(|a| a == "-c" || a == "-C" || a == "--create"),
        _ => false,
    }
}
