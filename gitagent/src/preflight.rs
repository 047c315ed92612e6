//! Startup checks: repository, identity, entitlement. Fails closed.

use std::fmt;
use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::exit_codes;
use crate::io::entitlement::{Entitlement, EntitlementService};
use crate::io::git::Git;
use crate::io::identity::IdentityStore;

/// Everything a run needs once the checks pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    pub git_dir: PathBuf,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    NotARepository(String),
    NotSetUp,
    EntitlementMissing { identity: String },
    EntitlementUnavailable(String),
}

impl Refusal {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotARepository(_) => exit_codes::NOT_A_REPOSITORY,
            Self::NotSetUp => exit_codes::NOT_SET_UP,
            Self::EntitlementMissing { .. } => exit_codes::ENTITLEMENT_MISSING,
            Self::EntitlementUnavailable(_) => exit_codes::ENTITLEMENT_UNAVAILABLE,
        }
    }
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotARepository(detail) => write!(
                f,
                "Not inside a git repository ({detail}). Run gitagent from a repository's working tree."
            ),
            Self::NotSetUp => write!(f, "No identity configured. Run `gitagent setup` first."),
            Self::EntitlementMissing { identity } => write!(
                f,
                "No active API key for {identity}. Contact support to activate your account."
            ),
            Self::EntitlementUnavailable(reason) => write!(
                f,
                "Could not verify your entitlement ({reason}). Check your connection and retry later."
            ),
        }
    }
}

#[instrument(skip_all)]
pub fn check<E: EntitlementService + ?Sized>(
    git: &Git,
    identities: &IdentityStore,
    entitlement: &E,
) -> Result<Ready, Refusal> {
    let git_dir = git
        .git_dir()
        .map_err(|err| Refusal::NotARepository(format!("{err:#}")))?;

    let identity = match identities.load() {
        Ok(Some(identity)) => identity,
        Ok(None) => return Err(Refusal::NotSetUp),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "identity file unreadable");
            return Err(Refusal::NotSetUp);
        }
    };

    match entitlement.check(&identity) {
        Entitlement::Active => {
            info!("entitlement active");
            Ok(Ready { git_dir, identity })
        }
        Entitlement::Absent => Err(Refusal::EntitlementMissing { identity }),
        Entitlement::Unavailable(reason) => Err(Refusal::EntitlementUnavailable(reason)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;

    use super::*;
    use crate::test_support::TestRepo;

    struct Fixed(Entitlement);

    impl EntitlementService for Fixed {
        fn check(&self, _identity: &str) -> Entitlement {
            self.0.clone()
        }

        fn register(&self, _identity: &str) -> Result<()> {
            Ok(())
        }
    }

    fn identities_with(email: Option<&str>) -> (tempfile::TempDir, IdentityStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = IdentityStore::new(dir.path());
        if let Some(email) = email {
            store.save(email).expect("save");
        }
        (dir, store)
    }

    #[test]
    fn outside_repository_is_refused_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = Git::new(dir.path(), Duration::from_secs(10), 10_000);
        let (_keep, ids) = identities_with(None);
        let refusal = check(&git, &ids, &Fixed(Entitlement::Active)).expect_err("refused");
        assert_eq!(refusal.exit_code(), exit_codes::NOT_A_REPOSITORY);
    }

    #[test]
    fn missing_identity_needs_setup() {
        let repo = TestRepo::new();
        let (_keep, ids) = identities_with(None);
        let refusal = check(&repo.git(), &ids, &Fixed(Entitlement::Active)).expect_err("refused");
        assert_eq!(refusal, Refusal::NotSetUp);
        assert!(refusal.to_string().contains("gitagent setup"));
    }

    #[test]
    fn entitlement_outcomes_map_to_distinct_refusals() {
        let repo = TestRepo::new();
        let (_keep, ids) = identities_with(Some("dev@example.com"));

        let ready = check(&repo.git(), &ids, &Fixed(Entitlement::Active)).expect("ready");
        assert_eq!(ready.identity, "dev@example.com");
        assert!(ready.git_dir.ends_with(".git"));

        let missing = check(&repo.git(), &ids, &Fixed(Entitlement::Absent)).expect_err("absent");
        assert_eq!(missing.exit_code(), exit_codes::ENTITLEMENT_MISSING);

        let down = check(
            &repo.git(),
            &ids,
            &Fixed(Entitlement::Unavailable("timeout".to_string())),
        )
        .expect_err("unavailable");
        assert_eq!(down.exit_code(), exit_codes::ENTITLEMENT_UNAVAILABLE);
        assert!(down.to_string().contains("retry"));
    }
}
