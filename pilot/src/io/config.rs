//! Orchestrator configuration stored in `.agent.toml` at the project root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Orchestrator configuration (TOML).
///
/// Every field has a default, so the file is optional and may be partial.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PilotConfig {
    pub planner: PlannerConfig,
    pub server: ServerConfig,
    pub execution: ExecutionConfig,
}

/// Settings for the planning/summarizing service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub model: String,
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub api_base: String,
    /// Environment variable holding the API credential.
    pub api_key_env: String,
    pub temperature: f64,
    pub summary_temperature: f64,
    /// Number of recent session records shown to the planner.
    pub history_window: usize,
    /// Maximum bytes of the planner system prompt before history is dropped.
    pub prompt_budget_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            summary_temperature: 0.3,
            history_window: 6,
            prompt_budget_bytes: 40_000,
            request_timeout_secs: 120,
        }
    }
}

/// Settings for the supervised background server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Shell command that runs the server in the foreground.
    pub command: String,
    pub host: String,
    pub port: u16,
    pub health_attempts: u32,
    pub health_interval_ms: u64,
    /// Grace period between SIGTERM and a forced kill.
    pub stop_grace_secs: u64,
    /// Plan commands skipped when the server is already running.
    pub start_commands: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "make run".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            health_attempts: 20,
            health_interval_ms: 500,
            stop_grace_secs: 5,
            start_commands: vec!["make run".to_string(), "./scripts/dev.sh".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn health_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// Settings for foreground command execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fixed verification command used by the smoke-check shortcut.
    pub smoke_command: String,
    /// Captured stdout/stderr beyond this many bytes is discarded.
    pub output_limit_bytes: usize,
    /// Characters of stdout/stderr kept in each session record.
    pub preview_chars: usize,
    /// Characters of stdout/stderr echoed to the terminal per step.
    pub display_chars: usize,
    /// Kill foreground commands after this many seconds. Unset means no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            smoke_command: "python3 scripts/smoke_test.py".to_string(),
            output_limit_bytes: 100_000,
            preview_chars: 600,
            display_chars: 4_000,
            command_timeout_secs: None,
        }
    }
}

impl ExecutionConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.planner.model.trim().is_empty() {
            return Err(anyhow!("planner.model must be non-empty"));
        }
        if self.planner.api_key_env.trim().is_empty() {
            return Err(anyhow!("planner.api_key_env must be non-empty"));
        }
        if self.planner.request_timeout_secs == 0 {
            return Err(anyhow!("planner.request_timeout_secs must be > 0"));
        }
        if self.planner.prompt_budget_bytes == 0 {
            return Err(anyhow!("planner.prompt_budget_bytes must be > 0"));
        }
        if self.server.command.trim().is_empty() {
            return Err(anyhow!("server.command must be non-empty"));
        }
        if self.server.health_attempts == 0 {
            return Err(anyhow!("server.health_attempts must be > 0"));
        }
        if self.execution.smoke_command.trim().is_empty() {
            return Err(anyhow!("execution.smoke_command must be non-empty"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.execution.command_timeout_secs == Some(0) {
            return Err(anyhow!("execution.command_timeout_secs must be > 0 when set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
