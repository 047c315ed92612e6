//! Choose the next action for a session.
//!
//! The oracle proposes; the reply is parsed leniently and then passed through
//! the deterministic guards (step-zero enforcement, current-branch deletion).

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::intent::{is_action_request, seed_context};
use crate::core::reply::{enforce_step_zero, fallback_action, guard_branch_delete, parse_reply};
use crate::core::types::{Action, ActionKind, RepositorySnapshot, Session};
use crate::io::oracle::Oracle;
use crate::io::prompt::{PlannerInput, PromptBuilder};

/// Where a planned action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// Parsed from a structured oracle reply.
    Oracle,
    /// The reply held no structured data; keyword fallback applied.
    Fallback,
    /// The oracle could not be reached.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    pub action: Action,
    pub source: PlanSource,
}

/// Plan one action for the session's next step.
///
/// On the first step of a fresh session the workflow context is seeded from
/// the request text before the prompt is built.
#[instrument(skip_all, fields(session = %session.session_id, step = session.current_step))]
pub fn plan<O: Oracle + ?Sized>(
    oracle: &O,
    prompts: &PromptBuilder,
    snapshot: &RepositorySnapshot,
    session: &mut Session,
) -> Result<Planned> {
    let step = session.current_step;
    let request = session.request_text();
    if step == 0 && session.workflow_context.is_empty() {
        seed_context(
            &mut session.workflow_context,
            &request,
            &session.original_branch,
        );
        debug!(facts = ?session.workflow_context.summary_lines(), "seeded workflow context");
    }

    let query = request.as_str();
    let prompt = prompts.planner(&PlannerInput {
        session,
        snapshot,
        step,
        action_request: is_action_request(query),
    })?;

    let reply = match oracle.complete(&prompt) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(err = %err, "planner could not reach the oracle");
            return Ok(Planned {
                action: Action::stop(format!("Planning {err}")),
                source: PlanSource::Unavailable,
            });
        }
    };

    let (action, source) = match parse_reply(&reply) {
        Some(action) => (action, PlanSource::Oracle),
        None => {
            warn!(reply_bytes = reply.len(), "no structured action in reply, using fallback");
            (fallback_action(query, step, &reply), PlanSource::Fallback)
        }
    };
    let action = enforce_step_zero(action, query, step);
    let action = guard_branch_delete(action, &snapshot.branches);
    let action = if action.kind == ActionKind::RunCommand && action.command.trim().is_empty() {
        Action::provide_info(action.reasoning)
    } else {
        action
    };

    info!(kind = action.kind.as_str(), command = %action.command, "planned action");
    Ok(Planned { action, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedOracle, sample_session, sample_snapshot};

    fn session(query: &str, branch: &str) -> Session {
        let mut session = sample_session("session_1");
        session.original_query = query.to_string();
        session.original_branch = branch.to_string();
        session
    }

    fn snapshot_on(branch: &str) -> RepositorySnapshot {
        let mut snap = sample_snapshot();
        snap.branches = if branch == "main" {
            "  feature\n* main\n".to_string()
        } else {
            format!("* {branch}\n  main\n")
        };
        snap
    }

    #[test]
    fn extracts_the_structured_block_from_prose() {
        let oracle = ScriptedOracle::new(vec![Ok(r#"I think we should stage.
{"action_type": "execute_command", "command": "git add .", "reasoning": "stage", "expected_outcome": "staged", "verification_commands": ["status"]}
Afterwards, {consider} committing."#
            .to_string())]);
        let mut session = session("stage everything", "main");
        let planned = plan(&oracle, &PromptBuilder::new(24_000), &snapshot_on("main"), &mut session)
            .expect("plan");
        assert_eq!(planned.source, PlanSource::Oracle);
        assert_eq!(planned.action.kind, ActionKind::RunCommand);
        assert_eq!(planned.action.command, "git add .");
        assert_eq!(planned.action.verification_probes, vec!["status"]);
    }

    #[test]
    fn unstage_falls_back_to_reset_on_prose_reply() {
        let oracle = ScriptedOracle::new(vec![Ok("You could unstage them.".to_string())]);
        let mut session = session("unstage changes", "main");
        let planned = plan(&oracle, &PromptBuilder::new(24_000), &snapshot_on("main"), &mut session)
            .expect("plan");
        assert_eq!(planned.source, PlanSource::Fallback);
        assert_eq!(planned.action.command, "reset HEAD .");
    }

    #[test]
    fn delete_current_branch_is_rewritten_to_checkout() {
        let oracle = ScriptedOracle::new(vec![Ok(
            r#"{"action_type":"execute_command","command":"branch -d feature","reasoning":"delete"}"#
                .to_string(),
        )]);
        let mut session = session("delete current branch", "feature");
        let planned =
            plan(&oracle, &PromptBuilder::new(24_000), &snapshot_on("feature"), &mut session)
                .expect("plan");
        assert_eq!(planned.action.command, "checkout main");
        assert_eq!(
            session.workflow_context.target_branch_to_delete.as_deref(),
            Some("feature")
        );
        assert!(oracle.prompts()[0].contains("Target branch to delete: feature"));
    }

    #[test]
    fn unavailable_oracle_stops_with_reason() {
        let oracle = ScriptedOracle::unavailable();
        let mut session = session("commit my work", "main");
        let planned = plan(&oracle, &PromptBuilder::new(24_000), &snapshot_on("main"), &mut session)
            .expect("plan");
        assert_eq!(planned.source, PlanSource::Unavailable);
        assert_eq!(planned.action.kind, ActionKind::Stop);
        assert!(planned.action.reasoning.contains("service unavailable"));
    }

    #[test]
    fn action_request_never_gets_info_on_first_step() {
        let oracle = ScriptedOracle::new(vec![Ok(
            r#"{"action_type":"provide_info","reasoning":"explain branching"}"#.to_string(),
        )]);
        let mut session = session("create branch topic", "main");
        let planned = plan(&oracle, &PromptBuilder::new(24_000), &snapshot_on("main"), &mut session)
            .expect("plan");
        assert_eq!(planned.action.kind, ActionKind::RunCommand);
        assert_eq!(planned.action.command, "checkout -b topic");
    }

    #[test]
    fn empty_command_later_in_session_becomes_info() {
        let oracle = ScriptedOracle::new(vec![Ok(
            r#"{"action_type":"execute_command","command":"  ","reasoning":"nothing to run"}"#
                .to_string(),
        )]);
        let mut session = session("what changed?", "main");
        session.current_step = 2;
        let planned = plan(&oracle, &PromptBuilder::new(24_000), &snapshot_on("main"), &mut session)
            .expect("plan");
        assert_eq!(planned.action.kind, ActionKind::ProvideInfo);
    }
}
