//! Shared deterministic types for the agent core.
//!
//! These types define stable contracts between components. They carry no I/O
//! and serialize to the on-disk session format.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::context::WorkflowContext;

/// What the planner wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Run one git subcommand against the working tree.
    #[serde(rename = "execute_command")]
    RunCommand,
    /// Answer in natural language without touching the repository.
    #[serde(rename = "provide_info")]
    ProvideInfo,
    /// Nothing left to do (or nothing can be done).
    #[serde(rename = "end")]
    Stop,
}

impl ActionKind {
    /// Parse an `action_type` value from an oracle reply.
    ///
    /// Returns `None` for unrecognized values so callers pick the default explicitly.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "execute_command" | "run_command" | "command" | "execute" => Some(Self::RunCommand),
            "provide_info" | "info" | "answer" => Some(Self::ProvideInfo),
            "end" | "stop" | "done" => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunCommand => "execute_command",
            Self::ProvideInfo => "provide_info",
            Self::Stop => "end",
        }
    }
}

/// One planner decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Git subcommand plus arguments, without the `git` prefix.
    pub command: String,
    pub reasoning: String,
    pub expected_outcome: String,
    /// Read-only commands to run after `command` to check its effect.
    pub verification_probes: Vec<String>,
}

impl Action {
    pub fn run(
        command: impl Into<String>,
        reasoning: impl Into<String>,
        expected_outcome: impl Into<String>,
        probes: &[&str],
    ) -> Self {
        Self {
            kind: ActionKind::RunCommand,
            command: command.into(),
            reasoning: reasoning.into(),
            expected_outcome: expected_outcome.into(),
            verification_probes: probes.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn provide_info(reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::ProvideInfo,
            command: String::new(),
            reasoning: reasoning.into(),
            expected_outcome: String::new(),
            verification_probes: Vec::new(),
        }
    }

    pub fn stop(reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Stop,
            command: String::new(),
            reasoning: reasoning.into(),
            expected_outcome: String::new(),
            verification_probes: Vec::new(),
        }
    }
}

/// Read-only view of the repository, rebuilt after every executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySnapshot {
    pub status: String,
    pub branches: String,
    pub remote_branches: String,
    pub recent_commits: String,
    pub diff_stat: String,
    pub unpushed_commits: String,
    pub remotes: String,
}

/// Result of checking whether a command achieved its goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub success: bool,
    /// Probe command → probe output.
    pub evidence: BTreeMap<String, String>,
    /// Every failure reason encountered, in discovery order.
    pub issues: Vec<String>,
}

/// Audit record for one executed command. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    /// 1-indexed step number within the session.
    pub step: u32,
    pub command: String,
    pub reasoning: String,
    pub expected_outcome: String,
    pub raw_output: String,
    pub verification_outcome: VerificationOutcome,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

/// Lifecycle of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Paused,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one user workflow (`<sessions-dir>/<session_id>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: String,
    pub original_query: String,
    /// Follow-up requests folded into this session after it was created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_requests: Vec<String>,
    /// Branch checked out when the session was created, before any mutation.
    pub original_branch: String,
    #[serde(default)]
    pub workflow_context: WorkflowContext,
    #[serde(default)]
    pub execution_history: Vec<ExecutionHistoryEntry>,
    /// Number of commands executed so far.
    #[serde(default)]
    pub current_step: u32,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        created_at: impl Into<String>,
        original_query: impl Into<String>,
        original_branch: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: created_at.into(),
            original_query: original_query.into(),
            additional_requests: Vec::new(),
            original_branch: original_branch.into(),
            workflow_context: WorkflowContext::default(),
            execution_history: Vec::new(),
            current_step: 0,
            status: SessionStatus::Active,
        }
    }

    /// The original request followed by every follow-up, one per line.
    pub fn request_text(&self) -> String {
        std::iter::once(self.original_query.as_str())
            .chain(self.additional_requests.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Commands executed in this session, oldest first.
    pub fn executed_commands(&self) -> Vec<&str> {
        self.execution_history
            .iter()
            .map(|entry| entry.command.as_str())
            .collect()
    }

    /// Commands whose verification passed, oldest first.
    pub fn verified_commands(&self) -> Vec<&str> {
        self.execution_history
            .iter()
            .filter(|entry| entry.verification_outcome.success)
            .map(|entry| entry.command.as_str())
            .collect()
    }

    /// Append a history entry and advance the step counter.
    pub fn record(&mut self, entry: ExecutionHistoryEntry) {
        self.current_step = entry.step;
        self.execution_history.push(entry);
    }
}

/// Why a workflow stopped before the planner ran out of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The user declined to run the proposed command.
    Declined,
    /// The user chose not to continue after a failed verification.
    AbortedAfterFailure,
    /// The step budget ran out while the workflow still wanted to continue.
    StepBudgetExhausted,
    /// The oracle could not be reached.
    OracleUnavailable,
}

impl HaltReason {
    /// Session status recorded for this halt.
    pub fn session_status(self) -> SessionStatus {
        match self {
            Self::AbortedAfterFailure => SessionStatus::Failed,
            Self::Declined | Self::StepBudgetExhausted | Self::OracleUnavailable => {
                SessionStatus::Paused
            }
        }
    }

    pub fn explanation(self) -> &'static str {
        match self {
            Self::Declined => "stopped because the proposed command was declined; resume later with `gitagent resume`",
            Self::AbortedAfterFailure => "stopped after a command failed verification and the workflow was not continued",
            Self::StepBudgetExhausted => "stopped because the step budget ran out; resume later with `gitagent resume`",
            Self::OracleUnavailable => "stopped because the planning service is unavailable; retry later",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_parses_known_aliases() {
        assert_eq!(
            ActionKind::parse("execute_command"),
            Some(ActionKind::RunCommand)
        );
        assert_eq!(ActionKind::parse(" Provide_Info "), Some(ActionKind::ProvideInfo));
        assert_eq!(ActionKind::parse("end"), Some(ActionKind::Stop));
        assert_eq!(ActionKind::parse("launch_rocket"), None);
    }

    #[test]
    fn session_status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Paused).expect("serialize");
        assert_eq!(json, "\"paused\"");
    }

    #[test]
    fn halt_reasons_map_to_resumable_or_failed() {
        assert_eq!(HaltReason::Declined.session_status(), SessionStatus::Paused);
        assert_eq!(
            HaltReason::AbortedAfterFailure.session_status(),
            SessionStatus::Failed
        );
        assert!(HaltReason::AbortedAfterFailure.session_status().is_terminal());
        assert!(!HaltReason::OracleUnavailable.session_status().is_terminal());
    }
}
