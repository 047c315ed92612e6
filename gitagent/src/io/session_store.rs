//! Durable session records (`<git-dir>/gitagent_sessions/<session_id>.json`).
//!
//! One JSON file per session, rewritten atomically after every mutation. At
//! most one record may be `active`; the store refuses to create a second one.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, instrument, warn};

use crate::core::types::{Session, SessionStatus};
use crate::io::config::write_atomic;

/// Returned by [`SessionStore::create`] when another session is still active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSessionExists {
    pub session_id: String,
}

impl fmt::Display for ActiveSessionExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} is still active; resume or supersede it first",
            self.session_id
        )
    }
}

impl std::error::Error for ActiveSessionExists {}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Atomically write a session record (temp file + rename).
    #[instrument(skip_all, fields(session_id = %session.session_id, status = %session.status))]
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.session_id);
        debug!(path = %path.display(), step = session.current_step, "saving session");
        let mut buf = serde_json::to_string_pretty(session).context("serialize session")?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    pub fn load(&self, session_id: &str) -> Result<Session> {
        let path = self.path_for(session_id);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read session {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse session {}", path.display()))
    }

    /// Every readable session, oldest first. Malformed records are skipped.
    pub fn list(&self) -> Result<Vec<Session>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("read sessions dir {}", self.dir.display()))?;
        let mut sessions = Vec::new();
        for entry in entries {
            let path = entry.context("read sessions dir entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| serde_json::from_str::<Session>(&text).map_err(Into::into));
            match parsed {
                Ok(session) => sessions.push(session),
                Err(err) => warn!(path = %path.display(), err = %err, "skipping unreadable session"),
            }
        }
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    /// The active session, if any (the most recent one if several slipped through).
    pub fn find_active(&self) -> Result<Option<Session>> {
        let mut active: Vec<Session> = self
            .list()?
            .into_iter()
            .filter(|s| s.status == SessionStatus::Active)
            .collect();
        if active.len() > 1 {
            warn!(count = active.len(), "multiple active sessions on disk");
        }
        Ok(active.pop())
    }

    /// Most recent paused session.
    pub fn latest_paused(&self) -> Result<Option<Session>> {
        Ok(self
            .list()?
            .into_iter()
            .rev()
            .find(|s| s.status == SessionStatus::Paused))
    }

    /// `session_<unix-seconds>`, suffixed `_2`, `_3`, ... if already taken.
    pub fn next_session_id(&self, now: DateTime<Utc>) -> String {
        let base = format!("session_{}", now.timestamp());
        if !self.path_for(&base).exists() {
            return base;
        }
        (2u32..)
            .map(|n| format!("{base}_{n}"))
            .find(|id| !self.path_for(id).exists())
            .unwrap_or(base)
    }

    /// Create and persist a new active session.
    ///
    /// Fails with [`ActiveSessionExists`] while another session is active.
    #[instrument(skip_all, fields(original_branch))]
    pub fn create(&self, query: &str, original_branch: &str, now: DateTime<Utc>) -> Result<Session> {
        if let Some(active) = self.find_active()? {
            return Err(ActiveSessionExists {
                session_id: active.session_id,
            }
            .into());
        }
        let session = Session::new(
            self.next_session_id(now),
            timestamp(now),
            query,
            original_branch,
        );
        self.save(&session)?;
        debug!(session_id = %session.session_id, "created session");
        Ok(session)
    }

    /// Move an active session aside so a new one can start; it stays resumable.
    pub fn supersede(&self, session: &mut Session) -> Result<()> {
        debug!(session_id = %session.session_id, "superseding active session");
        session.status = SessionStatus::Paused;
        self.save(session)
    }
}

/// RFC 3339 timestamp used in session records.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}
