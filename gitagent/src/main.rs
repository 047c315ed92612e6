//! `gitagent`: plan, confirm, run and verify multi-step git workflows.
//!
//! Each request becomes a session persisted under the repository's git dir.
//! Every proposed command is confirmed before it runs and verified after.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gitagent::core::types::ActionKind;
use gitagent::exit_codes;
use gitagent::io::config::{AgentConfig, load_effective_config};
use gitagent::io::confirm::{AutoApprove, Confirmer, TerminalConfirmer};
use gitagent::io::entitlement::HttpEntitlement;
use gitagent::io::git::Git;
use gitagent::io::identity::IdentityStore;
use gitagent::io::oracle::ChatOracle;
use gitagent::io::session_store::SessionStore;
use gitagent::logging;
use gitagent::orchestrator::{Agent, AgentEvent, RunOutcome};
use gitagent::planner::PlanSource;
use gitagent::preflight::{self, Ready};
use gitagent::setup::{SetupOutcome, run_setup};

/// Lines of command output echoed while a workflow runs.
const OUTPUT_PREVIEW_LINES: usize = 12;

#[derive(Parser)]
#[command(
    name = "gitagent",
    version,
    about = "Plan, confirm, run and verify multi-step git workflows",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// What to do, in plain words (e.g. "stage and commit my changes").
    query: Vec<String>,

    /// Run proposed commands without asking.
    #[arg(short = 'y', long)]
    auto_approve: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Store your email and register it with the entitlement service.
    Setup,
    /// List sessions recorded for this repository.
    Sessions,
    /// Resume a paused session (the most recent one by default).
    Resume {
        session_id: Option<String>,

        /// Run proposed commands without asking.
        #[arg(short = 'y', long)]
        auto_approve: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Some(Command::Setup) => cmd_setup(&cwd),
        Some(Command::Sessions) => cmd_sessions(&cwd),
        Some(Command::Resume {
            session_id,
            auto_approve,
        }) => cmd_workflow(&cwd, Request::Resume(session_id), auto_approve),
        None => cmd_workflow(&cwd, Request::Query(cli.query.join(" ")), cli.auto_approve),
    }
}

enum Request {
    Query(String),
    Resume(Option<String>),
}

/// Config from `<git-dir>/gitagent/config.toml`, or defaults outside a repository.
fn effective_config(git: &Git) -> Result<AgentConfig> {
    match git.git_dir() {
        Ok(git_dir) => load_effective_config(&git_dir.join("gitagent").join("config.toml")),
        Err(_) => {
            let mut cfg = AgentConfig::default();
            cfg.apply_env(|key| std::env::var(key).ok());
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

fn repo_git(cwd: &Path, config: &AgentConfig) -> Git {
    Git::new(cwd, config.command_timeout(), config.output_limit_bytes)
        .with_log_entries(config.log_entries)
}

fn cmd_setup(cwd: &Path) -> Result<i32> {
    let git = Git::new(cwd, Duration::from_secs(10), 10_000);
    let config = effective_config(&git)?;
    let identities = IdentityStore::default_location()?;
    let suggested = git.global_config("user.email");
    let entitlement = HttpEntitlement::new(&config.entitlement);

    match run_setup(
        suggested.as_deref(),
        &TerminalConfirmer,
        &identities,
        &entitlement,
    )? {
        SetupOutcome::Registered { email } => {
            println!("Saved {email} to {}.", identities.path().display());
            println!("Registered with the entitlement service.");
        }
        SetupOutcome::SavedLocally { email, reason } => {
            println!("Saved {email} to {}.", identities.path().display());
            println!("Registration did not complete ({reason}); contact support if access stays unavailable.");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_sessions(cwd: &Path) -> Result<i32> {
    let probe = Git::new(cwd, Duration::from_secs(10), 10_000);
    let git_dir = match probe.git_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("Not inside a git repository ({err:#}).");
            return Ok(exit_codes::NOT_A_REPOSITORY);
        }
    };
    let config = effective_config(&probe)?;
    let store = SessionStore::new(git_dir.join(&config.sessions_dir));
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No sessions recorded.");
    }
    for session in sessions {
        println!(
            "{}  {:<9}  {} steps  {}",
            session.session_id,
            session.status.as_str(),
            session.current_step,
            session.original_query
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_workflow(cwd: &Path, request: Request, auto_approve: bool) -> Result<i32> {
    let probe = Git::new(cwd, Duration::from_secs(10), 10_000);
    let config = effective_config(&probe)?;
    let git = repo_git(cwd, &config);
    let identities = IdentityStore::default_location()?;
    let entitlement = HttpEntitlement::new(&config.entitlement);

    let Ready { git_dir, identity } = match preflight::check(&git, &identities, &entitlement) {
        Ok(ready) => ready,
        Err(refusal) => {
            eprintln!("{refusal}");
            return Ok(refusal.exit_code());
        }
    };
    tracing::info!(identity = %identity, git_dir = %git_dir.display(), "preflight passed");

    let confirmer: &dyn Confirmer = if auto_approve {
        &AutoApprove
    } else {
        &TerminalConfirmer
    };
    let store = SessionStore::new(git_dir.join(&config.sessions_dir));
    let oracle = ChatOracle::from_env(config.oracle.clone());
    let agent = Agent::new(&git, &oracle, confirmer, &store, &config);

    let mut session = match request {
        Request::Query(query) => {
            let query = match query.trim() {
                "" => confirmer
                    .ask("What would you like to do?", None)
                    .unwrap_or_default(),
                text => text.to_string(),
            };
            if query.trim().is_empty() {
                eprintln!("No request given.");
                return Ok(exit_codes::INVALID);
            }
            agent.start(&query)?
        }
        Request::Resume(session_id) => {
            let session = agent.resume(session_id.as_deref())?;
            println!(
                "Resuming {} ({} steps done): {}",
                session.session_id, session.current_step, session.original_query
            );
            session
        }
    };

    let outcome = agent.drive(&mut session, &mut print_event)?;
    print_outcome(&outcome);
    Ok(exit_codes::OK)
}

fn print_event(event: &AgentEvent<'_>) {
    match event {
        AgentEvent::Planned {
            step,
            action,
            source,
        } => {
            if *source == PlanSource::Fallback {
                println!("(no structured plan in the reply; using a default)");
            }
            match action.kind {
                ActionKind::RunCommand => {
                    println!("\nStep {step}: git {}", action.command);
                    println!("  Why: {}", action.reasoning);
                    if !action.expected_outcome.is_empty() {
                        println!("  Expect: {}", action.expected_outcome);
                    }
                }
                ActionKind::ProvideInfo => println!("\nAnswering without running commands."),
                ActionKind::Stop => {}
            }
        }
        AgentEvent::Executed { output, .. } => {
            let lines: Vec<&str> = output.lines().collect();
            for line in lines.iter().take(OUTPUT_PREVIEW_LINES) {
                println!("  | {line}");
            }
            if lines.len() > OUTPUT_PREVIEW_LINES {
                println!("  | ... ({} more lines)", lines.len() - OUTPUT_PREVIEW_LINES);
            }
        }
        AgentEvent::Verified { outcome, .. } => {
            if outcome.success {
                println!("  Verified.");
            } else {
                println!("  Verification found issues:");
                for issue in &outcome.issues {
                    println!("    - {issue}");
                }
            }
        }
        AgentEvent::Assessed(assessment) => {
            let pattern = assessment
                .classification
                .pattern
                .map_or("general", |p| p.label());
            if !assessment.missing.is_empty() {
                println!(
                    "  Workflow {pattern}: still to do {}",
                    assessment.missing.join(", ")
                );
            }
        }
        AgentEvent::Halted(reason) => println!("\nHalted: {}.", reason.explanation()),
    }
}

fn print_outcome(outcome: &RunOutcome) {
    println!("\n{}", outcome.response);
    println!(
        "\nSession {} is {}.",
        outcome.session_id,
        outcome.status.as_str()
    );
    if !outcome.commands.is_empty() {
        println!("Commands executed in this session: {}", outcome.commands.len());
        for (i, command) in outcome.commands.iter().enumerate() {
            println!("  {}. git {command}", i + 1);
        }
    }
}
