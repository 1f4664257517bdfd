//! Lifecycle of the one supervised background server.
//!
//! The server runs as a detached child (its own process group on Unix) with
//! stdout and stderr appended to a log file. The supervisor owns the child and
//! its [`ProcessHandle`] and never hands out copies of either.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{ProcessHandle, ProcessStatus};
use crate::io::health::{HealthProbe, poll_health};
use crate::io::process::{kill_group, own_process_group, terminate_group};

/// What to launch and where its output goes.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    /// Shell command run with `sh -c`.
    pub command: String,
    pub workdir: PathBuf,
    pub log_path: PathBuf,
    /// Time allowed between SIGTERM and a forced kill.
    pub stop_grace: Duration,
}

#[derive(Debug)]
struct Supervised {
    child: Child,
    handle: ProcessHandle,
}

/// Starts, polls and stops a single background server.
#[derive(Debug)]
pub struct ProcessSupervisor {
    spec: ServerSpec,
    active: Option<Supervised>,
}

impl ProcessSupervisor {
    pub fn new(spec: ServerSpec) -> Self {
        Self { spec, active: None }
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    /// Handle of the current server, if one was started and not stopped.
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.active.as_ref().map(|s| &s.handle)
    }

    /// Launch the server and return immediately with status `starting`.
    ///
    /// Refuses while a previously started child is still alive.
    #[instrument(skip(self), fields(command = %self.spec.command))]
    pub fn start(&mut self) -> Result<&ProcessHandle> {
        if let Some(active) = self.active.as_mut() {
            match active.child.try_wait() {
                Ok(None) => bail!(
                    "supervised server already running (pid {})",
                    active.handle.pid
                ),
                Ok(Some(status)) => {
                    debug!(pid = active.handle.pid, ?status, "previous server exited");
                }
                Err(err) => {
                    warn!(pid = active.handle.pid, err = %err, "cannot query previous server");
                }
            }
        }

        let log = open_log(&self.spec.log_path)?;
        let log_err = log
            .try_clone()
            .with_context(|| format!("clone log handle {}", self.spec.log_path.display()))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.spec.command)
            .current_dir(&self.spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        own_process_group(&mut cmd);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawn server `{}`", self.spec.command))?;
        let handle = ProcessHandle {
            pid: child.id(),
            log_path: self.spec.log_path.clone(),
            status: ProcessStatus::Starting,
        };
        info!(pid = handle.pid, log = %handle.log_path.display(), "server started in background");

        let supervised = self.active.insert(Supervised { child, handle });
        Ok(&supervised.handle)
    }

    /// Poll the server's health endpoint and record the outcome on the handle.
    ///
    /// Returns `false` without probing when no server was started.
    pub fn poll_health<P: HealthProbe + ?Sized>(
        &mut self,
        probe: &P,
        url: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let healthy = poll_health(probe, url, max_attempts, interval);
        active.handle.status = if healthy {
            ProcessStatus::Healthy
        } else {
            ProcessStatus::Unhealthy
        };
        healthy
    }

    /// Terminate the server: SIGTERM, wait for the grace period, then kill.
    ///
    /// Best effort; failures are logged and swallowed.
    #[instrument(skip(self))]
    pub fn stop(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let pid = active.handle.pid;

        match active.child.try_wait() {
            Ok(Some(status)) => {
                // Already reaped; the group id may belong to someone else now.
                debug!(pid, ?status, "server had already exited");
                active.handle.status = ProcessStatus::Stopped;
                return;
            }
            Ok(None) => {}
            Err(err) => warn!(pid, err = %err, "cannot query server before stopping"),
        }

        terminate_group(pid);
        match active.child.wait_timeout(self.spec.stop_grace) {
            Ok(Some(status)) => debug!(pid, ?status, "server exited after SIGTERM"),
            Ok(None) => {
                warn!(pid, grace_secs = self.spec.stop_grace.as_secs(), "server ignored SIGTERM, killing");
                force_kill(&mut active.child, pid);
            }
            Err(err) => {
                warn!(pid, err = %err, "failed waiting for server, killing");
                force_kill(&mut active.child, pid);
            }
        }
        active.handle.status = ProcessStatus::Stopped;
        info!(pid, "server stopped");
    }
}

fn force_kill(child: &mut Child, pid: u32) {
    kill_group(pid);
    if let Err(err) = child.kill() {
        warn!(pid, err = %err, "failed to kill server");
    }
    if let Err(err) = child.wait() {
        warn!(pid, err = %err, "failed to reap server");
    }
}

fn open_log(path: &std::path::Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open server log {}", path.display()))
}
