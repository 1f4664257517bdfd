//! Shared deterministic types for the orchestrator core.
//!
//! These types define stable contracts between the planner, the policy gate,
//! the executor and the session store. They carry no I/O handles.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Reserved plan entry meaning "start the supervised background service".
///
/// Intercepted by the executor and redirected to the process supervisor; it is
/// never tokenized or handed to a shell.
pub const START_SERVER_SENTINEL: &str = "__START_SERVER_BG__";

/// One proposed action with the reason it was proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Literal action text. Never empty after trimming.
    #[serde(rename = "cmd")]
    pub text: String,
    pub rationale: String,
}

impl Command {
    /// Build a command, returning `None` when `text` is blank.
    pub fn new(text: &str, rationale: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            rationale: rationale.trim().to_string(),
        })
    }

    pub fn start_server(rationale: &str) -> Self {
        Self {
            text: START_SERVER_SENTINEL.to_string(),
            rationale: rationale.to_string(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.text == START_SERVER_SENTINEL
    }
}

/// Ordered candidate actions for a single goal. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    summary: String,
    commands: Vec<Command>,
    notes: String,
}

impl Plan {
    pub fn new(summary: impl Into<String>, commands: Vec<Command>, notes: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands,
            notes: notes.into(),
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }
}

/// Which planner path produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// Deterministic plan for a recognized goal phrasing.
    Shortcut,
    /// Plan proposed by the external planning collaborator.
    Delegated,
}

impl PlanSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanSource::Shortcut => "shortcut",
            PlanSource::Delegated => "delegated",
        }
    }
}

/// Outcome of one executed step, persisted to the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: String,
    pub goal: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout_preview: String,
    pub stderr_preview: String,
}

/// Append-only execution history, most recent last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub history: Vec<ExecutionRecord>,
}

impl Session {
    /// The last `window` records in chronological order.
    pub fn recent(&self, window: usize) -> &[ExecutionRecord] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }
}

/// Lifecycle state of the supervised background service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Starting,
    Healthy,
    Unhealthy,
    Stopped,
}

/// Identity of the supervised background service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub log_path: PathBuf,
    pub status: ProcessStatus,
}
