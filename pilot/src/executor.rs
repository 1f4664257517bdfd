//! Sequential, fail-fast execution of an approved plan.
//!
//! Each step produces one [`ExecutionRecord`] that is appended to the session
//! store before the next step starts. The start sentinel is routed to the
//! [`ProcessSupervisor`] and never reaches a shell.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::screen::ApprovedPlan;
use crate::core::transcript::{command_entry, join_entries, server_start_entry, truncate_chars};
use crate::core::types::{Command, ExecutionRecord};
use crate::io::health::HealthProbe;
use crate::io::process::CommandRunner;
use crate::io::session_store::SessionStore;
use crate::io::supervisor::ProcessSupervisor;

/// Timestamp layout of [`ExecutionRecord::timestamp`] (local time).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Per-run settings for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Goal text stored on every record.
    pub goal: String,
    pub health_url: String,
    pub health_attempts: u32,
    pub health_interval: Duration,
    pub preview_chars: usize,
}

/// Why execution stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStop {
    /// Every approved command ran.
    Completed,
    /// A command exited non-zero; later commands did not run.
    Failed { command: String, exit_code: i32 },
}

/// Progress notifications for the caller.
#[derive(Debug)]
pub enum StepEvent<'a> {
    Started {
        index: usize,
        total: usize,
        command: &'a Command,
    },
    Finished {
        index: usize,
        total: usize,
        record: &'a ExecutionRecord,
        /// Full captured stdout (not the bounded preview).
        stdout: &'a str,
        stderr: &'a str,
    },
}

/// Result of running an approved plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub transcript: String,
    pub records: Vec<ExecutionRecord>,
    pub stop: ExecutionStop,
    /// Degraded-but-continued conditions (e.g. history not persisted).
    pub notices: Vec<String>,
}

struct StepResult {
    record: ExecutionRecord,
    entry: String,
    stdout: String,
    stderr: String,
}

/// Runs approved commands against a shell runner and the server supervisor.
pub struct Executor<'a, R: CommandRunner + ?Sized, P: HealthProbe + ?Sized> {
    runner: &'a R,
    probe: &'a P,
    supervisor: &'a mut ProcessSupervisor,
    settings: ExecutorSettings,
}

impl<'a, R: CommandRunner + ?Sized, P: HealthProbe + ?Sized> Executor<'a, R, P> {
    pub fn new(
        runner: &'a R,
        probe: &'a P,
        supervisor: &'a mut ProcessSupervisor,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            runner,
            probe,
            supervisor,
            settings,
        }
    }

    /// Execute `plan` in order, stopping at the first non-zero exit.
    ///
    /// Never returns an error: command failures are recorded as data and
    /// history write failures become notices.
    #[instrument(skip_all, fields(commands = plan.commands().len()))]
    pub fn run<F: FnMut(StepEvent<'_>)>(
        &mut self,
        plan: &ApprovedPlan,
        store: &mut SessionStore,
        mut on_step: F,
    ) -> ExecutionReport {
        let total = plan.commands().len();
        let mut entries = Vec::with_capacity(total);
        let mut records = Vec::with_capacity(total);
        let mut notices = Vec::new();
        let mut stop = ExecutionStop::Completed;

        for (index, command) in plan.commands().iter().enumerate() {
            on_step(StepEvent::Started {
                index,
                total,
                command,
            });

            let step = if command.is_sentinel() {
                self.start_server()
            } else {
                self.run_shell(command)
            };

            if let Err(err) = store.append(step.record.clone()) {
                warn!(err = %format!("{err:#}"), "failed to persist session record");
                notices.push(format!("session history not saved: {err:#}"));
            }
            on_step(StepEvent::Finished {
                index,
                total,
                record: &step.record,
                stdout: &step.stdout,
                stderr: &step.stderr,
            });

            entries.push(step.entry);
            let exit_code = step.record.exit_code;
            records.push(step.record);

            if exit_code != 0 && !command.is_sentinel() {
                info!(command = %command.text, exit_code, "stopping after failed command");
                stop = ExecutionStop::Failed {
                    command: command.text.clone(),
                    exit_code,
                };
                break;
            }
        }

        ExecutionReport {
            transcript: join_entries(&entries),
            records,
            stop,
            notices,
        }
    }

    fn start_server(&mut self) -> StepResult {
        let label = format!("{} (background)", self.supervisor.spec().command);
        match self.supervisor.start().map(|handle| handle.pid) {
            Ok(pid) => {
                let healthy = self.supervisor.poll_health(
                    self.probe,
                    &self.settings.health_url,
                    self.settings.health_attempts,
                    self.settings.health_interval,
                );
                let entry = server_start_entry(pid, healthy);
                if !healthy {
                    warn!(pid, "server did not become healthy");
                }
                StepResult {
                    record: self.record(&label, 0, &entry, ""),
                    stdout: entry.clone(),
                    stderr: String::new(),
                    entry,
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(err = %message, "failed to start server");
                StepResult {
                    record: self.record(&label, 1, "", &message),
                    entry: command_entry(&label, 1, "", &message),
                    stdout: String::new(),
                    stderr: message,
                }
            }
        }
    }

    fn run_shell(&self, command: &Command) -> StepResult {
        let (exit_code, stdout, stderr) = match self.runner.run(&command.text) {
            Ok(output) => {
                let mut stderr = output.stderr;
                if output.timed_out {
                    stderr.push_str("\n[killed: command timed out]");
                }
                (output.exit_code, output.stdout, stderr)
            }
            Err(err) => (-1, String::new(), format!("{err:#}")),
        };
        let stdout_trimmed = stdout.trim();
        let stderr_trimmed = stderr.trim();
        StepResult {
            record: self.record(&command.text, exit_code, stdout_trimmed, stderr_trimmed),
            entry: command_entry(&command.text, exit_code, stdout_trimmed, stderr_trimmed),
            stdout: stdout_trimmed.to_string(),
            stderr: stderr_trimmed.to_string(),
        }
    }

    fn record(&self, command: &str, exit_code: i32, stdout: &str, stderr: &str) -> ExecutionRecord {
        ExecutionRecord {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            goal: self.settings.goal.clone(),
            command: command.to_string(),
            exit_code,
            stdout_preview: truncate_chars(stdout, self.settings.preview_chars).to_string(),
            stderr_preview: truncate_chars(stderr, self.settings.preview_chars).to_string(),
        }
    }
}
