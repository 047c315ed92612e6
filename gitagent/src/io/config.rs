//! Agent configuration stored under `<git-dir>/gitagent/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_BASE_URL: &str = "GROQ_BASE_URL";
pub const ENV_MODEL: &str = "GROQ_MODEL";
pub const ENV_ENTITLEMENT_URL: &str = "GITAGENT_ENTITLEMENT_URL";

/// Agent configuration (TOML).
///
/// Missing fields take their defaults. Credentials never live here; they are
/// read from the environment by the oracle client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Wall-clock limit for every git invocation.
    pub command_timeout_secs: u64,

    /// Truncate captured git stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Entries of `git log` in a repository snapshot.
    pub log_entries: u32,

    /// Rendered prompts are trimmed to this many bytes.
    pub prompt_budget_bytes: usize,

    /// Commands a single run may execute before it pauses.
    pub max_steps: u32,

    /// Session records directory, relative to the git dir.
    pub sessions_dir: String,

    pub oracle: OracleConfig,
    pub entitlement: EntitlementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// OpenAI-compatible API root (`.../v1`).
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    /// How long a rejected credential stays out of rotation.
    pub key_cooldown_secs: u64,
    pub retry_base_delay_ms: u64,
    /// Credentials are read from `<prefix>1`, `<prefix>2`, ... until the first gap.
    pub key_env_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EntitlementConfig {
    /// Base URL of the entitlement service; unset means entitlement cannot be checked.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            max_retries: 3,
            request_timeout_secs: 30,
            key_cooldown_secs: 60 * 60,
            retry_base_delay_ms: 1_000,
            key_env_prefix: "GROQ_API_KEY_".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            output_limit_bytes: 100_000,
            log_entries: 5,
            prompt_budget_bytes: 24_000,
            max_steps: 10,
            sessions_dir: "gitagent_sessions".to_string(),
            oracle: OracleConfig::default(),
            entitlement: EntitlementConfig {
                endpoint: None,
                timeout_secs: 8,
            },
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.sessions_dir.trim().is_empty() {
            return Err(anyhow!("sessions_dir must not be empty"));
        }
        if self.oracle.base_url.trim().is_empty() || self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.base_url and oracle.model must not be empty"));
        }
        if self.oracle.max_retries == 0 {
            return Err(anyhow!("oracle.max_retries must be > 0"));
        }
        if self.oracle.request_timeout_secs == 0 {
            return Err(anyhow!("oracle.request_timeout_secs must be > 0"));
        }
        if self.entitlement.timeout_secs == 0 {
            return Err(anyhow!("entitlement.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.oracle.base_url = url;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.oracle.model = model;
        }
        if let Some(endpoint) = non_empty(ENV_ENTITLEMENT_URL) {
            self.entitlement.endpoint = Some(endpoint);
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config and apply process environment overrides.
pub fn load_effective_config(path: &Path) -> Result<AgentConfig> {
    let mut cfg = load_config(path)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
