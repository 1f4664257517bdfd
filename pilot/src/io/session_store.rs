//! Append-only session history (`.agent_session.json`).
//!
//! History is best-effort: a missing or corrupted file loads as an empty
//! session, and a failed write leaves the record in memory only. Every append
//! rewrites the whole file atomically before returning.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::types::{ExecutionRecord, Session};

/// Write-through store for the session history of one project directory.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    session: Session,
}

impl SessionStore {
    /// Load the session at `path`, degrading to an empty session on any error.
    pub fn load(path: &Path) -> Self {
        let session = match read_session(path) {
            Ok(Some(session)) => {
                debug!(path = %path.display(), records = session.history.len(), "session loaded");
                session
            }
            Ok(None) => {
                debug!(path = %path.display(), "no session file, starting empty");
                Session::default()
            }
            Err(err) => {
                warn!(path = %path.display(), err = %format!("{err:#}"), "unreadable session, starting empty");
                Session::default()
            }
        };
        Self {
            path: path.to_path_buf(),
            session,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Append `record` and persist the whole history.
    ///
    /// The record stays in memory even when the write fails.
    pub fn append(&mut self, record: ExecutionRecord) -> Result<()> {
        self.session.history.push(record);
        write_session(&self.path, &self.session)
    }
}

fn read_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session {}", path.display()))?;
    let session: Session = serde_json::from_str(&contents)
        .with_context(|| format!("parse session {}", path.display()))?;
    Ok(Some(session))
}

/// Atomically write the session to disk (temp file + rename).
fn write_session(path: &Path, session: &Session) -> Result<()> {
    debug!(path = %path.display(), records = session.history.len(), "writing session");
    let mut buf = serde_json::to_string_pretty(session).context("serialize session")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}
