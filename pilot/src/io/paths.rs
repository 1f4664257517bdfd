//! Canonical state file locations within a project directory.

use std::path::PathBuf;

/// All files the orchestrator owns under a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    /// Append-only execution history (`.agent_session.json`).
    pub session_path: PathBuf,
    /// Combined output of the supervised server (`.server.log`).
    pub server_log_path: PathBuf,
    /// Optional configuration (`.agent.toml`).
    pub config_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            session_path: root.join(".agent_session.json"),
            server_log_path: root.join(".server.log"),
            config_path: root.join(".agent.toml"),
            root,
        }
    }
}
