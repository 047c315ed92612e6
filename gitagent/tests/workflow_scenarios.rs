//! End-to-end workflows against real repositories with a scripted oracle.

use gitagent::core::types::{ActionKind, HaltReason, SessionStatus};
use gitagent::io::config::AgentConfig;
use gitagent::io::confirm::AutoApprove;
use gitagent::io::executor::RepositoryInspector;
use gitagent::io::session_store::SessionStore;
use gitagent::orchestrator::{Agent, AgentEvent, RunOutcome};
use gitagent::test_support::{ScriptedOracle, TestRepo};

fn store_for(repo: &TestRepo) -> SessionStore {
    SessionStore::new(repo.path().join(".git").join("gitagent_sessions"))
}

/// Run one request and collect every proposed command.
fn run(repo: &TestRepo, oracle: &ScriptedOracle, query: &str) -> (RunOutcome, Vec<String>) {
    let git = repo.git();
    let store = store_for(repo);
    let agent = Agent::new(&git, oracle, &AutoApprove, &store, &AgentConfig::default());
    let mut session = agent.start(query).expect("start");
    let mut proposed = Vec::new();
    let outcome = agent
        .drive(&mut session, &mut |event| {
            if let AgentEvent::Planned { action, .. } = event
                && action.kind == ActionKind::RunCommand
            {
                proposed.push(action.command.clone());
            }
        })
        .expect("drive");
    let saved = store.load(&outcome.session_id).expect("reload");
    assert_eq!(saved, session);
    (outcome, proposed)
}

#[test]
fn unstage_changes_resets_and_completes() {
    let repo = TestRepo::new();
    repo.write_file("draft.txt", "wip\n");
    repo.run(&["add", "draft.txt"]);
    let oracle = ScriptedOracle::new(vec![
        Ok("You can unstage everything with a reset.".to_string()),
        Ok("All staged changes were unstaged.".to_string()),
    ]);

    let (outcome, proposed) = run(&repo, &oracle, "unstage changes");

    assert_eq!(proposed, vec!["reset HEAD ."]);
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.response, "All staged changes were unstaged.");
    let status = repo.git().status();
    assert!(!status.contains("Changes to be committed"), "{status}");
    assert!(status.contains("draft.txt"));
}

#[test]
fn delete_current_branch_switches_away_first() {
    let repo = TestRepo::new();
    repo.run(&["checkout", "-q", "-b", "feature"]);
    let delete = r#"{"action_type":"execute_command","command":"branch -d feature","reasoning":"delete the branch","expected_outcome":"feature is gone","verification_commands":["branch"]}"#;
    let oracle = ScriptedOracle::new(vec![
        Ok(delete.to_string()),
        Ok(delete.to_string()),
        Ok("Switched to main and deleted feature.".to_string()),
    ]);

    let (outcome, proposed) = run(&repo, &oracle, "delete current branch");

    assert_eq!(proposed, vec!["checkout main", "branch -d feature"]);
    assert_eq!(outcome.commands, proposed);
    assert_eq!(outcome.status, SessionStatus::Completed);
    let branches = repo.git().branches();
    assert!(!branches.contains("feature"), "{branches}");
    assert!(branches.contains("* main"));
    // The second planning round still targets the branch the session started on.
    assert!(oracle.prompts()[1].contains("Target branch to delete: feature"));
}

#[test]
fn structured_block_is_taken_from_chatty_reply() {
    let repo = TestRepo::new();
    repo.write_file("notes.md", "todo\n");
    let oracle = ScriptedOracle::new(vec![
        Ok(r#"Let's stage it first.
```json
{"action_type": "execute_command", "command": "git add notes.md", "reasoning": "stage notes", "expected_outcome": "notes staged", "verification_commands": ["status"]}
```
After that you may want to {commit} it."#
            .to_string()),
        Ok("notes.md is staged.".to_string()),
    ]);

    let (outcome, proposed) = run(&repo, &oracle, "stage notes.md");

    assert_eq!(proposed, vec!["git add notes.md"]);
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert!(repo.git().status().contains("Changes to be committed"));
}

#[test]
fn exhausted_oracle_stops_before_running_anything() {
    let repo = TestRepo::new();
    repo.write_file("a.txt", "a\n");
    let oracle = ScriptedOracle::unavailable();

    let (outcome, proposed) = run(&repo, &oracle, "stage and commit everything");

    assert!(proposed.is_empty());
    assert!(outcome.commands.is_empty());
    assert_eq!(outcome.halt, Some(HaltReason::OracleUnavailable));
    assert_eq!(outcome.status, SessionStatus::Paused);
    assert!(outcome.response.contains("service unavailable"));
    assert_eq!(oracle.prompts().len(), 1);
}
