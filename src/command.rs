//! Bounded execution of external commands.
//!
//! [`BoundedCommand`] spawns an encoder invocation as a child process,
//! captures its output in full, and enforces an optional wall-clock deadline.
//! On unix the child runs in its own process group so a deadline kill also
//! reaches anything the encoder forked. Failures are classified into the
//! distinct [`Error`](crate::Error) variants rather than folded into one
//! message: spawn failure, timeout, cancellation, and non-zero exit each
//! surface on their own.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Output captured from a completed invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit status (always successful; failures become errors).
    pub status: std::process::ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for one external command invocation with an optional deadline.
///
/// The builder holds no state between invocations; a configured instance can
/// be cloned and reused across directives.
///
/// # Example
///
/// ```no_run
/// use jp2derive::BoundedCommand;
/// use std::path::PathBuf;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> jp2derive::Result<()> {
/// let mut cmd = BoundedCommand::new(PathBuf::from("kdu_compress"));
/// cmd.arg("-i")
///     .arg("/tmp/source.tif")
///     .arg("-o")
///     .arg("/tmp/out.jp2")
///     .timeout(Duration::from_secs(120));
/// let output = cmd.execute(&CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BoundedCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl BoundedCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the wall-clock deadline. Without one the command runs to completion.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = Some(d);
        self
    }

    /// The program path.
    pub fn get_program(&self) -> &PathBuf {
        &self.program
    }

    /// The accumulated arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// The full command line, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// The `cancel` token allows the caller to abort the invocation early;
    /// cancellation kills the process exactly like a timeout but reports
    /// [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// - [`Error::Spawn`] if the process could not be started.
    /// - [`Error::Timeout`] if the deadline expired; the process group is
    ///   killed with SIGKILL before the error is returned.
    /// - [`Error::Cancelled`] if the token fired first.
    /// - [`Error::ExitStatus`] if the process exited non-zero; carries the
    ///   captured stderr.
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<CommandOutput> {
        let command_line = self.command_line();
        tracing::debug!(command = %command_line, timeout = ?self.timeout, "executing");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| Error::Spawn {
            command: command_line.clone(),
            source,
        })?;
        let pid = child.id();

        // wait_with_output drains both pipes concurrently while waiting, so
        // a chatty encoder cannot deadlock on pipe backpressure.
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let output = if let Some(timeout) = self.timeout {
            tokio::select! {
                result = &mut wait => result?,
                _ = tokio::time::sleep(timeout) => {
                    kill_process_group(pid);
                    // Dropping the wait future drops the child handle;
                    // kill_on_drop plus tokio's background reaper ensure the
                    // direct child is terminated and reaped, never zombied.
                    tracing::warn!(command = %command_line, ?timeout, "killed after deadline");
                    return Err(Error::Timeout { command: command_line, timeout });
                }
                _ = cancel.cancelled() => {
                    kill_process_group(pid);
                    tracing::info!(command = %command_line, "killed after cancellation");
                    return Err(Error::Cancelled { command: command_line });
                }
            }
        } else {
            tokio::select! {
                result = &mut wait => result?,
                _ = cancel.cancelled() => {
                    kill_process_group(pid);
                    tracing::info!(command = %command_line, "killed after cancellation");
                    return Err(Error::Cancelled { command: command_line });
                }
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(Error::ExitStatus {
                command: command_line,
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput {
            status: output.status,
            stdout,
            stderr,
        })
    }
}

/// Kill the child's entire process group with an unignorable signal.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // Negative pid addresses the process group created at spawn.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {
    // kill_on_drop terminates the direct child when the wait future drops.
}

/// Strategy seam for running encoder commands.
///
/// The orchestrator holds a runner chosen at construction time; tests inject
/// stubs here instead of subclassing anything.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion or failure.
    async fn run(&self, command: BoundedCommand, cancel: &CancellationToken)
        -> Result<CommandOutput>;
}

/// Default runner backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: BoundedCommand,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        command.execute(cancel).await
    }
}
