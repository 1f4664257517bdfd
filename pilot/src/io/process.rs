//! Foreground shell command execution with bounded output capture.
//!
//! Commands run through `sh -c` in the project root, each in its own process
//! group so a timeout can kill everything the shell forked. The
//! [`CommandRunner`] trait decouples the executor from real processes so tests
//! can script outcomes without spawning anything.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured outcome of a finished shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Abstraction over foreground command execution.
pub trait CommandRunner {
    fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Runs commands with `sh -c` in a fixed working directory.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    workdir: PathBuf,
    output_limit_bytes: usize,
    timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new(workdir: impl Into<PathBuf>, output_limit_bytes: usize, timeout: Option<Duration>) -> Self {
        Self {
            workdir: workdir.into(),
            output_limit_bytes,
            timeout,
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.workdir);
        own_process_group(&mut cmd);
        run_captured(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run `{command}`"))
    }
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// Without a `timeout` the call blocks until the child exits. On timeout the child's process group
/// is killed as well, so `cmd` should be spawned with [`own_process_group`] or grandchildren holding
/// the pipes keep the readers blocked.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_captured(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match timeout {
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                kill_group(child.id());
                if let Err(err) = child.kill() {
                    debug!(err = %err, "child already gone after group kill");
                }
                child.wait().context("wait command after kill")?
            }
        },
        None => child.wait().context("wait for command")?,
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    let exit_code = exit_code(status, timed_out);
    debug!(exit_code, timed_out, "command finished");
    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn exit_code(status: ExitStatus, timed_out: bool) -> i32 {
    match status.code() {
        Some(code) if !timed_out => code,
        _ => -1,
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Put the spawned child at the head of a new process group.
#[cfg(unix)]
pub(crate) fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
pub(crate) fn own_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn signal_group(pid: u32, signal: &str) {
    // `-pid` addresses the whole group led by `pid`.
    let result = Command::new("kill")
        .arg(signal)
        .arg("--")
        .arg(format!("-{pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = result {
        warn!(pid, signal, err = %err, "failed to run kill");
    }
}

#[cfg(unix)]
pub(crate) fn terminate_group(pid: u32) {
    signal_group(pid, "-TERM");
}

#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) {
    signal_group(pid, "-KILL");
}

#[cfg(not(unix))]
pub(crate) fn terminate_group(_pid: u32) {}

#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: u32) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
