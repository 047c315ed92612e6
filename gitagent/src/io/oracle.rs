//! Chat-completions client used as the planning oracle.
//!
//! Credentials rotate through a [`KeyPool`]: a key rejected with 429/401/403
//! cools down and the next one is tried immediately; other failures back off
//! exponentially. Exhausting attempts or keys yields [`OracleUnavailable`].

use std::cell::RefCell;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::backoff::retry_delay;
use crate::core::key_pool::{KeyPool, mask_key};
use crate::io::config::OracleConfig;

const SYSTEM_PROMPT: &str = "You are GitAgent, an AI assistant specialized in Git operations. \
Analyze the repository state and provide helpful Git command suggestions.";

/// The oracle could not produce a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleUnavailable {
    pub reason: String,
}

impl OracleUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for OracleUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service unavailable: {}", self.reason)
    }
}

impl std::error::Error for OracleUnavailable {}

/// Text in, text out.
pub trait Oracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleUnavailable>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Non-2xx HTTP status.
    Status(u16),
    Network(String),
}

impl TransportError {
    /// The credential itself was refused; rotate instead of waiting.
    pub fn rejects_key(&self) -> bool {
        matches!(self, Self::Status(401 | 403 | 429))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Network(err) => write!(f, "network error: {err}"),
        }
    }
}

/// One authenticated JSON POST.
pub trait ChatTransport {
    fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<String, TransportError>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl ChatTransport for UreqTransport {
    fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();
        let mut response = agent
            .post(url)
            .header("Authorization", &format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(TransportError::Status(status));
        }
        response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError::Network(err.to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Reply text from a chat-completions response body.
fn reply_text(body: &str) -> Option<String> {
    let response: ChatResponse = serde_json::from_str(body).ok()?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
}

/// `<base>/chat/completions`, unless the base already names the endpoint.
pub fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

/// Read `<prefix>1`, `<prefix>2`, ... until the first missing or empty value.
pub fn load_keys(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    (1..)
        .map_while(|i| {
            lookup(&format!("{prefix}{i}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .collect()
}

/// Oracle backed by an OpenAI-compatible chat endpoint.
pub struct ChatOracle<T = UreqTransport> {
    config: OracleConfig,
    keys: RefCell<KeyPool>,
    transport: T,
}

impl ChatOracle<UreqTransport> {
    /// Credentials come from the process environment.
    pub fn from_env(config: OracleConfig) -> Self {
        let keys = load_keys(&config.key_env_prefix, |key| std::env::var(key).ok());
        Self::with_transport(config, keys, UreqTransport)
    }
}

impl<T: ChatTransport> ChatOracle<T> {
    pub fn with_transport(config: OracleConfig, keys: Vec<String>, transport: T) -> Self {
        let pool = KeyPool::new(keys, Duration::from_secs(config.key_cooldown_secs));
        Self {
            config,
            keys: RefCell::new(pool),
            transport,
        }
    }

    fn request_body(&self, prompt: &str) -> Result<String, OracleUnavailable> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        serde_json::to_string(&request)
            .map_err(|err| OracleUnavailable::new(format!("encode request: {err}")))
    }
}

impl<T: ChatTransport> Oracle for ChatOracle<T> {
    #[instrument(skip_all, fields(model = %self.config.model, prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String, OracleUnavailable> {
        if self.keys.borrow().is_empty() {
            warn!(prefix = %self.config.key_env_prefix, "no oracle credentials configured");
            return Err(OracleUnavailable::new("no API keys configured"));
        }
        let body = self.request_body(prompt)?;
        let url = completions_url(&self.config.base_url);
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let base_delay = Duration::from_millis(self.config.retry_base_delay_ms);
        let mut last_error = String::from("no attempts made");

        for attempt in 0..self.config.max_retries {
            let acquired = self
                .keys
                .borrow_mut()
                .acquire(Instant::now())
                .map(|(idx, key)| (idx, key.to_string()));
            let Some((index, key)) = acquired else {
                warn!("all oracle credentials are cooling down");
                return Err(OracleUnavailable::new("all API keys are exhausted"));
            };
            debug!(attempt, key = %mask_key(&key), "oracle request");

            match self.transport.post(&url, &key, &body, timeout) {
                Ok(text) => {
                    return reply_text(&text)
                        .ok_or_else(|| OracleUnavailable::new("response carried no reply text"));
                }
                Err(err) if err.rejects_key() => {
                    warn!(attempt, key = %mask_key(&key), err = %err, "credential rejected, rotating");
                    self.keys.borrow_mut().mark_rejected(index, Instant::now());
                    last_error = err.to_string();
                }
                Err(err) => {
                    let delay = retry_delay(base_delay, attempt);
                    warn!(attempt, err = %err, delay_ms = delay.as_millis() as u64, "oracle request failed");
                    last_error = err.to_string();
                    if attempt + 1 < self.config.max_retries {
                        thread::sleep(delay);
                    }
                }
            }
        }
        Err(OracleUnavailable::new(format!(
            "gave up after {} attempts ({last_error})",
            self.config.max_retries
        )))
    }
}
