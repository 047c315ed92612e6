//! The agent state machine: plan, confirm, execute, verify, decide, respond.
//!
//! One workflow runs per invocation. The session is persisted after every
//! transition so an interrupted run can be resumed later.

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::branch::current_branch;
use crate::core::continuation::{Assessment, Decision, assess};
use crate::core::intent::is_continuation_request;
use crate::core::types::{
    Action, ActionKind, ExecutionHistoryEntry, HaltReason, Session, SessionStatus,
    VerificationOutcome,
};
use crate::io::config::AgentConfig;
use crate::io::confirm::Confirmer;
use crate::io::executor::{CommandExecutor, RepositoryInspector};
use crate::io::oracle::Oracle;
use crate::io::prompt::{InfoInput, PromptBuilder, history_summary};
use crate::io::session_store::{ActiveSessionExists, SessionStore, timestamp};
use crate::planner::{PlanSource, plan};
use crate::verifier::verify;

const INFO_UNAVAILABLE: &str =
    "I'm sorry, I couldn't generate an answer because the assistant service is unavailable. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Analyzer,
    CommandExecutor,
    InfoProvider,
    Responder,
    End,
}

/// Progress notifications for the caller's display.
#[derive(Debug)]
pub enum AgentEvent<'e> {
    Planned {
        step: u32,
        action: &'e Action,
        source: PlanSource,
    },
    Executed {
        step: u32,
        command: &'e str,
        output: &'e str,
    },
    Verified {
        step: u32,
        outcome: &'e VerificationOutcome,
    },
    Assessed(&'e Assessment),
    Halted(HaltReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    pub halt: Option<HaltReason>,
    pub response: String,
    /// Every command executed in the session, oldest first.
    pub commands: Vec<String>,
}

/// Drives sessions against one repository.
pub struct Agent<'a, R: ?Sized, O: ?Sized, C: ?Sized> {
    repo: &'a R,
    oracle: &'a O,
    confirmer: &'a C,
    store: &'a SessionStore,
    prompts: PromptBuilder,
    max_steps: u32,
}

impl<'a, R, O, C> Agent<'a, R, O, C>
where
    R: CommandExecutor + RepositoryInspector + ?Sized,
    O: Oracle + ?Sized,
    C: Confirmer + ?Sized,
{
    pub fn new(
        repo: &'a R,
        oracle: &'a O,
        confirmer: &'a C,
        store: &'a SessionStore,
        config: &AgentConfig,
    ) -> Self {
        Self {
            repo,
            oracle,
            confirmer,
            store,
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
            max_steps: config.max_steps,
        }
    }

    /// Session for a new request.
    ///
    /// An active session is either continued with the request folded in, or
    /// paused so a fresh session can start.
    #[instrument(skip_all)]
    pub fn start(&self, query: &str) -> Result<Session> {
        if let Some(mut active) = self.store.find_active()? {
            let prompt = format!(
                "An active session exists ({}: \"{}\"). Continue it?",
                active.session_id, active.original_query
            );
            if self.confirmer.confirm(&prompt, true) {
                if !is_continuation_request(query) {
                    active.additional_requests.push(query.trim().to_string());
                }
                info!(session = %active.session_id, "continuing active session");
                self.store.save(&active)?;
                return Ok(active);
            }
            self.store.supersede(&mut active)?;
        }
        let branch = current_branch(&self.repo.branches()).to_string();
        self.store.create(query, &branch, Utc::now())
    }

    /// Reactivate a paused session (the most recent one when no id is given).
    #[instrument(skip_all, fields(session = session_id.unwrap_or("latest")))]
    pub fn resume(&self, session_id: Option<&str>) -> Result<Session> {
        if let Some(active) = self.store.find_active()? {
            return Err(ActiveSessionExists {
                session_id: active.session_id,
            }
            .into());
        }
        let mut session = match session_id {
            Some(id) => self.store.load(id)?,
            None => self
                .store
                .latest_paused()?
                .ok_or_else(|| anyhow!("no paused session to resume"))?,
        };
        if session.status != SessionStatus::Paused {
            bail!(
                "session {} is {}; only paused sessions can be resumed",
                session.session_id,
                session.status.as_str()
            );
        }
        session.status = SessionStatus::Active;
        self.store.save(&session)?;
        Ok(session)
    }

    /// Run the state machine until it reaches `End`.
    #[instrument(skip_all, fields(session = %session.session_id))]
    pub fn drive(
        &self,
        session: &mut Session,
        observer: &mut dyn FnMut(&AgentEvent<'_>),
    ) -> Result<RunOutcome> {
        let mut state = AgentState::Analyzer;
        let mut action = Action::stop("");
        let mut halt: Option<HaltReason> = None;
        let mut info_answer: Option<String> = None;
        let mut response = String::new();
        let mut executed = 0u32;

        while state != AgentState::End {
            let next = match state {
                AgentState::Analyzer => {
                    if executed >= self.max_steps {
                        warn!(max_steps = self.max_steps, "step budget exhausted");
                        self.halt(session, &mut halt, HaltReason::StepBudgetExhausted, observer);
                        AgentState::Responder
                    } else {
                        let snapshot = self.repo.snapshot();
                        let planned = plan(self.oracle, &self.prompts, &snapshot, session)?;
                        observer(&AgentEvent::Planned {
                            step: session.current_step + 1,
                            action: &planned.action,
                            source: planned.source,
                        });
                        action = planned.action;
                        match action.kind {
                            ActionKind::RunCommand => AgentState::CommandExecutor,
                            ActionKind::ProvideInfo => AgentState::InfoProvider,
                            ActionKind::Stop => {
                                response = self.stop_response(
                                    session,
                                    &action,
                                    planned.source,
                                    executed,
                                    &mut halt,
                                    observer,
                                );
                                AgentState::End
                            }
                        }
                    }
                }
                AgentState::CommandExecutor => {
                    let step = session.current_step + 1;
                    let prompt = format!("Execute `git {}`?", action.command);
                    if self.confirmer.confirm(&prompt, true) {
                        let verification = self.execute_step(session, &action, step, observer);
                        executed += 1;
                        if !verification.success
                            && !self
                                .confirmer
                                .confirm("Verification failed. Continue the workflow anyway?", false)
                        {
                            self.halt(session, &mut halt, HaltReason::AbortedAfterFailure, observer);
                            AgentState::Responder
                        } else {
                            let assessment = assess(session, &action, Some(&verification), false);
                            if assessment.classification.is_ambiguous() {
                                warn!(
                                    chosen = ?assessment.classification.pattern.map(|p| p.label()),
                                    also = ?assessment
                                        .classification
                                        .also_matched
                                        .iter()
                                        .map(|p| p.label())
                                        .collect::<Vec<_>>(),
                                    "request matches several workflow patterns"
                                );
                            }
                            observer(&AgentEvent::Assessed(&assessment));
                            match assessment.decision {
                                Decision::Continue => AgentState::Analyzer,
                                Decision::Stop => AgentState::Responder,
                            }
                        }
                    } else {
                        info!(command = %action.command, "command declined");
                        self.halt(session, &mut halt, HaltReason::Declined, observer);
                        AgentState::Responder
                    }
                }
                AgentState::InfoProvider => {
                    info_answer = Some(self.answer(session, &action)?);
                    AgentState::Responder
                }
                AgentState::Responder => {
                    response = self.respond(session, info_answer.take(), executed, halt)?;
                    if halt.is_none() {
                        session.status = SessionStatus::Completed;
                    }
                    AgentState::End
                }
                AgentState::End => AgentState::End,
            };
            info!(from = ?state, to = ?next, "transition");
            state = next;
            self.store.save(session)?;
        }

        Ok(RunOutcome {
            session_id: session.session_id.clone(),
            status: session.status,
            halt,
            response,
            commands: session
                .executed_commands()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    fn halt(
        &self,
        session: &mut Session,
        halt: &mut Option<HaltReason>,
        reason: HaltReason,
        observer: &mut dyn FnMut(&AgentEvent<'_>),
    ) {
        session.status = reason.session_status();
        *halt = Some(reason);
        observer(&AgentEvent::Halted(reason));
    }

    fn execute_step(
        &self,
        session: &mut Session,
        action: &Action,
        step: u32,
        observer: &mut dyn FnMut(&AgentEvent<'_>),
    ) -> VerificationOutcome {
        let output = self.repo.execute(&action.command);
        observer(&AgentEvent::Executed {
            step,
            command: &action.command,
            output: &output,
        });
        let verification = verify(
            self.repo,
            &action.command,
            &output,
            &action.verification_probes,
        );
        observer(&AgentEvent::Verified {
            step,
            outcome: &verification,
        });
        if verification.success {
            session.workflow_context.record_command(&action.command);
        }
        session.record(ExecutionHistoryEntry {
            step,
            command: action.command.clone(),
            reasoning: action.reasoning.clone(),
            expected_outcome: action.expected_outcome.clone(),
            raw_output: output,
            verification_outcome: verification.clone(),
            timestamp: timestamp(Utc::now()),
        });
        verification
    }

    fn stop_response(
        &self,
        session: &mut Session,
        action: &Action,
        source: PlanSource,
        executed: u32,
        halt: &mut Option<HaltReason>,
        observer: &mut dyn FnMut(&AgentEvent<'_>),
    ) -> String {
        if source == PlanSource::Unavailable {
            self.halt(session, halt, HaltReason::OracleUnavailable, observer);
            return format!(
                "{}\n\nWorkflow {}.\n\n{}",
                action.reasoning,
                HaltReason::OracleUnavailable.explanation(),
                history_summary(session)
            );
        }
        if halt.is_none() {
            session.status = SessionStatus::Completed;
        }
        if executed == 0 {
            action.reasoning.clone()
        } else {
            format!("{}\n\n{}", action.reasoning, history_summary(session))
        }
    }

    fn answer(&self, session: &Session, action: &Action) -> Result<String> {
        let snapshot = self.repo.snapshot();
        let request = session.request_text();
        let prompt = self.prompts.info(&InfoInput {
            session,
            snapshot: &snapshot,
            query: &request,
            reasoning: &action.reasoning,
        })?;
        Ok(match self.oracle.complete(&prompt) {
            Ok(answer) => answer.trim().to_string(),
            Err(err) => {
                warn!(err = %err, "info provider could not reach the oracle");
                INFO_UNAVAILABLE.to_string()
            }
        })
    }

    /// Final response. An informational answer with nothing executed in this
    /// run is the response itself.
    fn respond(
        &self,
        session: &Session,
        info_answer: Option<String>,
        executed: u32,
        halt: Option<HaltReason>,
    ) -> Result<String> {
        if let Some(answer) = info_answer.as_ref().filter(|_| executed == 0) {
            return Ok(answer.clone());
        }
        let snapshot = self.repo.snapshot();
        let prompt = self.prompts.responder(session, &snapshot)?;
        let summary = match self.oracle.complete(&prompt) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(err = %err, "responder could not reach the oracle");
                format!("Workflow completed. {}", history_summary(session))
            }
        };
        let mut parts = Vec::new();
        if let Some(reason) = halt {
            parts.push(format!("Workflow {}.", reason.explanation()));
        }
        if let Some(answer) = info_answer {
            parts.push(answer);
        }
        parts.push(summary);
        Ok(parts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::confirm::AutoApprove;
    use crate::test_support::{ScriptedConfirmer, ScriptedOracle, TestRepo};

    fn run_action(command: &str, probes: &[&str]) -> String {
        serde_json::json!({
            "action_type": "execute_command",
            "command": command,
            "reasoning": format!("run {command}"),
            "expected_outcome": "done",
            "verification_commands": probes,
        })
        .to_string()
    }

    fn store_for(repo: &TestRepo) -> SessionStore {
        SessionStore::new(repo.path().join(".git").join("gitagent_sessions"))
    }

    fn drive(
        agent: &Agent<'_, crate::io::git::Git, ScriptedOracle, impl Confirmer>,
        query: &str,
    ) -> (Session, RunOutcome) {
        let mut session = agent.start(query).expect("start");
        let outcome = agent.drive(&mut session, &mut |_| {}).expect("drive");
        (session, outcome)
    }

    #[test]
    fn stage_and_commit_runs_until_both_are_verified() {
        let repo = TestRepo::new();
        repo.write_file("notes.txt", "hello\n");
        let git = repo.git();
        let oracle = ScriptedOracle::new(vec![
            Ok(run_action("add notes.txt", &["status"])),
            Ok(run_action("commit -m \"add notes\"", &["log --oneline -1"])),
            Ok("Staged and committed notes.txt.".to_string()),
        ]);
        let store = store_for(&repo);
        let agent = Agent::new(&git, &oracle, &AutoApprove, &store, &AgentConfig::default());

        let (session, outcome) = drive(&agent, "stage and commit my notes");

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.commands, vec!["add notes.txt", "commit -m \"add notes\""]);
        assert_eq!(outcome.response, "Staged and committed notes.txt.");
        assert_eq!(session.workflow_context.changes_committed, Some(true));
        let saved = store.load(&session.session_id).expect("load");
        assert_eq!(saved, session);
    }

    #[test]
    fn declining_pauses_without_running() {
        let repo = TestRepo::new();
        let git = repo.git();
        let oracle = ScriptedOracle::new(vec![
            Ok(run_action("checkout -b topic", &["branch"])),
            Ok("Nothing was done.".to_string()),
        ]);
        let confirmer = ScriptedConfirmer::new(vec![false]);
        let store = store_for(&repo);
        let agent = Agent::new(&git, &oracle, &confirmer, &store, &AgentConfig::default());

        let (_, outcome) = drive(&agent, "create branch topic");

        assert_eq!(outcome.status, SessionStatus::Paused);
        assert_eq!(outcome.halt, Some(HaltReason::Declined));
        assert!(outcome.commands.is_empty());
        assert!(confirmer.asked()[0].contains("git checkout -b topic"));
        assert!(outcome.response.starts_with("Workflow stopped because the proposed command was declined"));
        assert!(!git.branches().contains("topic"));
    }

    #[test]
    fn declined_failure_marks_session_failed() {
        let repo = TestRepo::new();
        let git = repo.git();
        let oracle = ScriptedOracle::new(vec![
            Ok(run_action("checkout no-such-branch", &["branch"])),
            Ok("The checkout failed.".to_string()),
        ]);
        // Approve the command, then refuse to continue after it fails.
        let confirmer = ScriptedConfirmer::new(vec![true, false]);
        let store = store_for(&repo);
        let agent = Agent::new(&git, &oracle, &confirmer, &store, &AgentConfig::default());

        let (session, outcome) = drive(&agent, "switch to no-such-branch");

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(outcome.halt, Some(HaltReason::AbortedAfterFailure));
        assert!(!session.execution_history[0].verification_outcome.success);
    }

    #[test]
    fn step_budget_pauses_a_looping_workflow() {
        let repo = TestRepo::new();
        let git = repo.git();
        let oracle = ScriptedOracle::new(vec![
            Ok(run_action("status", &[])),
            Ok("Still working.".to_string()),
        ]);
        let store = store_for(&repo);
        let config = AgentConfig {
            max_steps: 1,
            ..AgentConfig::default()
        };
        let agent = Agent::new(&git, &oracle, &AutoApprove, &store, &config);

        let (_, outcome) = drive(&agent, "add, commit, push and tag the release");

        assert_eq!(outcome.halt, Some(HaltReason::StepBudgetExhausted));
        assert_eq!(outcome.status, SessionStatus::Paused);
        assert_eq!(outcome.commands, vec!["status"]);
    }

    #[test]
    fn info_request_answers_without_running_commands() {
        let repo = TestRepo::new();
        let git = repo.git();
        let oracle = ScriptedOracle::new(vec![
            Ok(r#"{"action_type":"provide_info","reasoning":"describe history"}"#.to_string()),
            Ok("You have one commit on main.".to_string()),
        ]);
        let store = store_for(&repo);
        let agent = Agent::new(&git, &oracle, &AutoApprove, &store, &AgentConfig::default());

        let (_, outcome) = drive(&agent, "what is in my history?");

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.response, "You have one commit on main.");
        assert!(outcome.commands.is_empty());
        assert_eq!(oracle.prompts().len(), 2);
    }

    #[test]
    fn new_request_can_continue_the_active_session() {
        let repo = TestRepo::new();
        let git = repo.git();
        let store = store_for(&repo);
        let existing = store.create("stage my files", "main", Utc::now()).expect("create");
        let oracle = ScriptedOracle::unavailable();
        let agent = Agent::new(&git, &oracle, &AutoApprove, &store, &AgentConfig::default());

        let session = agent.start("then commit").expect("start");
        assert_eq!(session.session_id, existing.session_id);
        assert_eq!(session.original_query, "stage my files");
        assert_eq!(session.additional_requests, vec!["then commit"]);
        let saved = store.load(&existing.session_id).expect("load");
        assert_eq!(saved.additional_requests, vec!["then commit"]);

        let session = agent.start("continue").expect("start");
        assert_eq!(session.additional_requests, vec!["then commit"]);
    }

    #[test]
    fn declining_to_continue_supersedes_the_active_session() {
        let repo = TestRepo::new();
        let git = repo.git();
        let store = store_for(&repo);
        let existing = store.create("stage my files", "main", Utc::now()).expect("create");
        let oracle = ScriptedOracle::unavailable();
        let confirmer = ScriptedConfirmer::new(vec![false]);
        let agent = Agent::new(&git, &oracle, &confirmer, &store, &AgentConfig::default());

        let session = agent.start("show the log").expect("start");
        assert_ne!(session.session_id, existing.session_id);
        let old = store.load(&existing.session_id).expect("load");
        assert_eq!(old.status, SessionStatus::Paused);
        assert_eq!(
            store.find_active().expect("scan").map(|s| s.session_id),
            Some(session.session_id)
        );
    }

    #[test]
    fn resume_reactivates_the_latest_paused_session() {
        let repo = TestRepo::new();
        let git = repo.git();
        let store = store_for(&repo);
        let mut paused = store.create("commit my work", "main", Utc::now()).expect("create");
        store.supersede(&mut paused).expect("pause");
        let oracle = ScriptedOracle::unavailable();
        let agent = Agent::new(&git, &oracle, &AutoApprove, &store, &AgentConfig::default());

        let resumed = agent.resume(None).expect("resume");
        assert_eq!(resumed.session_id, paused.session_id);
        assert_eq!(resumed.status, SessionStatus::Active);

        let err = agent.resume(None).expect_err("already active");
        assert!(err.downcast_ref::<ActiveSessionExists>().is_some());
    }
}
