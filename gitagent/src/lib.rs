//! Stateful, verifiable git command agent.
//!
//! A free-text request becomes a session that is planned one command at a
//! time: an oracle proposes the next command, the user confirms it, the
//! command runs, and its effect is verified against the repository before the
//! next step is planned.
//!
//! - **[`core`]**: Pure, deterministic logic (branch parsing, command policy,
//!   reply parsing, verification checks, continuation decisions). No I/O.
//! - **[`io`]**: Side effects (git subprocesses, session files, network
//!   clients, prompts). Behind traits so tests can script them.
//!
//! Orchestration modules ([`planner`], [`verifier`], [`orchestrator`],
//! [`setup`], [`preflight`]) tie the two together for the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod preflight;
pub mod setup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verifier;
