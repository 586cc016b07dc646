//! Bounded execution of shell commands
//!
//! Commands run through the host shell with piped output. A run can be
//! bounded by a timeout and aborted through a [`CancellationToken`]. The
//! deadline covers draining the output pipes too, so a background job that
//! holds stdout open cannot stretch a run past it. On Unix every command
//! gets its own process group, and a timeout or cancellation kills the whole
//! group before the error is returned.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Result, StepError};

/// Output of a finished (or abandoned) command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Standard output with surrounding newlines trimmed
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or terminated by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandResult {
    /// Placeholder recorded for a command that hit its deadline
    pub fn timed_out() -> Self {
        Self { timed_out: true, ..Self::default() }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Turn a nonzero exit into a [`StepError::Command`]
    pub fn check(&self) -> Result<()> {
        if self.success() {
            return Ok(());
        }
        let message = match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None if self.timed_out => "timed out".to_string(),
            None => "terminated by signal".to_string(),
        };
        Err(StepError::Command {
            message,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        })
    }
}

/// How a run ended
enum Outcome {
    Exited {
        status: std::io::Result<ExitStatus>,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    Cancelled,
}

/// Runs shell commands with an optional directory, timeout and cancellation
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    dir: Option<PathBuf>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working directory for the command
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply a timeout only when one is configured
    pub fn maybe_timeout(mut self, timeout: Option<Duration>) -> Self {
        if timeout.is_some() {
            self.timeout = timeout;
        }
        self
    }

    /// Token that kills the command when cancelled
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run a command and require a zero exit status
    pub async fn run(&self, command: &str) -> Result<CommandResult> {
        let result = self.run_capture(command).await?;
        result.check()?;
        Ok(result)
    }

    /// Run a command and return its output whatever the exit status.
    ///
    /// Only a failure to start, the deadline and cancellation are errors.
    pub async fn run_capture(&self, command: &str) -> Result<CommandResult> {
        if command.trim().is_empty() {
            return Err(StepError::Argument("command is empty".to_string()));
        }

        debug!(command = %command, dir = ?self.dir, timeout = ?self.timeout, "Executing command");
        let started = Instant::now();

        let mut cmd = shell_command(command);
        if let Some(ref dir) = self.dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        let mut stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            (status, stdout, stderr) = async {
                let status = child.wait().await;
                let stdout = (&mut stdout_task).await.unwrap_or_default();
                let stderr = (&mut stderr_task).await.unwrap_or_default();
                (status, stdout, stderr)
            } => Outcome::Exited { status, stdout, stderr },
            _ = deadline => Outcome::TimedOut,
            _ = self.cancel.cancelled() => Outcome::Cancelled,
        };

        let (status, stdout, stderr) = match outcome {
            Outcome::Exited { status, stdout, stderr } => (status?, stdout, stderr),
            Outcome::TimedOut => {
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                let seconds = timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
                warn!(command = %command, seconds, "Command timed out, process killed");
                return Err(StepError::Timeout { seconds, command: command.to_string() });
            }
            Outcome::Cancelled => {
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                warn!(command = %command, "Command cancelled, process killed");
                return Err(StepError::Cancelled(command.to_string()));
            }
        };

        let result = CommandResult {
            stdout: stdout.trim_matches(|c| c == '\n' || c == '\r').to_string(),
            stderr,
            exit_code: status.code(),
            timed_out: false,
        };

        debug!(
            command = %command,
            exit_code = ?result.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout = %result.stdout,
            "Command finished"
        );

        Ok(result)
    }
}

/// Build the host shell invocation for a command line. On Unix the shell
/// leads a new process group so the whole command line can be killed.
#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);
    cmd.process_group(0);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", command]);
    cmd
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            warn!(error = %e, "Failed to read command output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Kill the shell's process group, then reap the shell
#[cfg(unix)]
async fn terminate(child: &mut Child, pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return kill_child(child).await;
    };

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            warn!(error = %e, pid, "Failed to kill process group");
            return kill_child(child).await;
        }
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, pid, "Failed to reap command process");
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, _pid: Option<u32>) {
    kill_child(child).await
}

async fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill command process");
    }
}
