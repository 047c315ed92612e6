//! Entitlement lookup: does this identity hold an active key?
//!
//! Fails closed. Anything other than a clear answer from the service is
//! reported as [`Entitlement::Unavailable`], and callers refuse to proceed.

use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::io::config::EntitlementConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entitlement {
    Active,
    Absent,
    /// The service could not give an answer (reason attached).
    Unavailable(String),
}

pub trait EntitlementService {
    fn check(&self, identity: &str) -> Entitlement;

    /// Register an identity; an already-registered identity is not an error.
    fn register(&self, identity: &str) -> Result<()>;
}

/// Interpret a `GET /users?email=` response.
pub fn classify_lookup(status: u16, body: &str) -> Entitlement {
    match status {
        200 => match serde_json::from_str::<Value>(body) {
            Ok(value) => {
                let record = match &value {
                    Value::Array(items) => items.first(),
                    other => Some(other),
                };
                if record.is_some_and(has_active_key) {
                    Entitlement::Active
                } else {
                    Entitlement::Absent
                }
            }
            Err(err) => Entitlement::Unavailable(format!("malformed entitlement response: {err}")),
        },
        404 => Entitlement::Absent,
        other => Entitlement::Unavailable(format!("entitlement service returned HTTP {other}")),
    }
}

fn has_active_key(record: &Value) -> bool {
    let api_key = record
        .get("apiKey")
        .and_then(Value::as_str)
        .is_some_and(|key| !key.trim().is_empty());
    let flag = record
        .get("has_active_key")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    api_key || flag
}

/// HTTP client for the entitlement service.
#[derive(Debug, Clone)]
pub struct HttpEntitlement {
    endpoint: Option<String>,
    timeout: Duration,
}

impl HttpEntitlement {
    pub fn new(config: &EntitlementConfig) -> Self {
        Self {
            endpoint: config
                .endpoint
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn agent(&self) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .new_agent()
    }
}

impl EntitlementService for HttpEntitlement {
    #[instrument(skip_all)]
    fn check(&self, identity: &str) -> Entitlement {
        let Some(endpoint) = &self.endpoint else {
            warn!("no entitlement endpoint configured");
            return Entitlement::Unavailable("no entitlement service configured".to_string());
        };
        let url = format!("{endpoint}/users");
        let response = self.agent().get(&url).query("email", identity).call();
        let mut response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(err = %err, "entitlement lookup failed");
                return Entitlement::Unavailable(format!("connection problem: {err}"));
            }
        };
        let status = response.status().as_u16();
        let body = match response.body_mut().read_to_string() {
            Ok(body) => body,
            Err(err) => return Entitlement::Unavailable(format!("read response: {err}")),
        };
        let outcome = classify_lookup(status, &body);
        debug!(status, outcome = ?outcome, "entitlement lookup");
        outcome
    }

    #[instrument(skip_all)]
    fn register(&self, identity: &str) -> Result<()> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| anyhow!("no entitlement service configured"))?;
        let body = serde_json::json!({ "email": identity });
        let response = self
            .agent()
            .post(&format!("{endpoint}/users"))
            .header("Content-Type", "application/json")
            .send(body.to_string())
            .map_err(|err| anyhow!("register identity: {err}"))?;
        let status = response.status().as_u16();
        debug!(status, "registration response");
        match status {
            200..=299 | 409 => Ok(()),
            other => Err(anyhow!("entitlement service returned HTTP {other}")),
        }
    }
}
