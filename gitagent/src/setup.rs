//! `gitagent setup`: store the user's identity and register it.

use anyhow::{Result, bail};
use tracing::{instrument, warn};

use crate::io::confirm::Confirmer;
use crate::io::entitlement::EntitlementService;
use crate::io::identity::{IdentityStore, is_valid_email};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    Registered { email: String },
    /// Saved locally; registration with the service failed.
    SavedLocally { email: String, reason: String },
}

/// Ask for an email (suggesting `suggested`), save it and register it.
#[instrument(skip_all)]
pub fn run_setup<C, E>(
    suggested: Option<&str>,
    confirmer: &C,
    identities: &IdentityStore,
    entitlement: &E,
) -> Result<SetupOutcome>
where
    C: Confirmer + ?Sized,
    E: EntitlementService + ?Sized,
{
    let Some(email) = confirmer.ask("Email address for gitagent:", suggested) else {
        bail!("setup cancelled");
    };
    let email = email.trim().to_string();
    if !is_valid_email(&email) {
        bail!("invalid email address: {email}");
    }
    identities.save(&email)?;

    match entitlement.register(&email) {
        Ok(()) => Ok(SetupOutcome::Registered { email }),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "registration failed");
            Ok(SetupOutcome::SavedLocally {
                email,
                reason: format!("{err:#}"),
            })
        }
    }
}
