//! Local identity store: a single email in `<config-dir>/gitagent/user.config`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::debug;

use crate::io::config::write_atomic;

/// Overrides the directory holding `user.config`.
pub const ENV_CONFIG_DIR: &str = "GITAGENT_CONFIG_DIR";

const FILE_NAME: &str = "user.config";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Directory for per-user configuration.
pub fn user_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(ENV_CONFIG_DIR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join("gitagent"))
        .ok_or_else(|| anyhow!("cannot determine the user configuration directory"))
}

#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(FILE_NAME),
        }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(user_config_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored identity, or `None` when setup has not run.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no identity file");
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        Ok(contents
            .lines()
            .filter_map(|line| line.trim().strip_prefix("email="))
            .map(str::trim)
            .find(|email| !email.is_empty())
            .map(str::to_string))
    }

    pub fn save(&self, email: &str) -> Result<()> {
        if !is_valid_email(email) {
            return Err(anyhow!("invalid email address: {email}"));
        }
        write_atomic(&self.path, &format!("email={email}\n"))
    }
}
