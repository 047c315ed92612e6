//! Verify that an executed command did what it claimed.
//!
//! Probes proposed by the planner run only when they are read-only; the
//! branch listing and status are re-read after every command.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use crate::core::command::{is_read_only, split_args};
use crate::core::types::VerificationOutcome;
use crate::core::verify::{PostState, SKIPPED_PROBE, assemble};
use crate::io::executor::{CommandExecutor, RepositoryInspector};

#[instrument(skip_all, fields(command = %command, probes = probes.len()))]
pub fn verify<R: CommandExecutor + RepositoryInspector + ?Sized>(
    repo: &R,
    command: &str,
    command_output: &str,
    probes: &[String],
) -> VerificationOutcome {
    let mut evidence = BTreeMap::new();
    for probe in probes {
        if is_read_only(&split_args(probe)) {
            let output = repo.execute(probe);
            debug!(probe = %probe, bytes = output.len(), "probe ran");
            evidence.insert(probe.clone(), output);
        } else {
            warn!(probe = %probe, "skipping probe that could change the repository");
            evidence.insert(probe.clone(), SKIPPED_PROBE.to_string());
        }
    }

    let post = PostState {
        branches: repo.branches(),
        status: repo.status(),
    };
    let outcome = assemble(command, command_output, evidence, &post);
    info!(success = outcome.success, issues = outcome.issues.len(), "verified");
    outcome
}
