//! External tool invocation.
//!
//! Every ripping, transcoding and probing binary runs through a
//! [`ToolRunner`]. Output is captured into a bounded buffer; going past the
//! cap is a failure, not a truncation. [`ToolInvoker`] adds the two call
//! modes the pipeline uses: strict (errors propagate) and lenient (errors
//! are logged and become `None`).

pub mod makemkv;
pub mod music;
pub mod transcode;

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ToolError;

/// Default ceiling for captured stdout/stderr, per stream.
pub const DEFAULT_OUTPUT_LIMIT: usize = 50 * 1024 * 1024;

/// A program and its arguments. Arguments are passed as-is, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a command to completion. A nonzero exit is still `Ok`; the
/// invoker decides what it means.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError>;
}

/// Spawns real subprocesses with `tokio::process`.
#[derive(Debug, Clone)]
pub struct SystemToolRunner {
    output_limit: usize,
}

impl SystemToolRunner {
    pub fn new() -> Self {
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn with_output_limit(output_limit: usize) -> Self {
        Self { output_limit }
    }
}

impl Default for SystemToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

enum CaptureError {
    Io(std::io::Error),
    Limit,
}

async fn read_capped<R>(reader: Option<R>, limit: usize) -> Result<Vec<u8>, CaptureError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await.map_err(CaptureError::Io)?;
        if n == 0 {
            break;
        }
        if buf.len() + n > limit {
            return Err(CaptureError::Limit);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        debug!(command = %command, "Running external tool");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Spawn {
                program: command.program.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.output_limit;

        let collect = async {
            let (out, err) = tokio::try_join!(read_capped(stdout, limit), read_capped(stderr, limit))?;
            let status = child.wait().await.map_err(CaptureError::Io)?;
            Ok::<_, CaptureError>((out, err, status))
        };

        let collected = match command.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, collect).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ToolError::Timeout {
                        program: command.program.clone(),
                        seconds: timeout.as_secs(),
                    })
                }
            },
            None => collect.await,
        };

        // Dropping `child` on an error path kills the process.
        let (out, err, status) = collected.map_err(|e| match e {
            CaptureError::Io(source) => ToolError::Io {
                program: command.program.clone(),
                source,
            },
            CaptureError::Limit => ToolError::OutputLimitExceeded {
                program: command.program.clone(),
                limit,
            },
        })?;

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&out).into_owned(),
            stderr: String::from_utf8_lossy(&err).into_owned(),
            code: status.code(),
        })
    }
}

/// Last few lines of stderr, for error messages.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

/// Strict and lenient call modes over a shared runner.
#[derive(Clone)]
pub struct ToolInvoker {
    runner: Arc<dyn ToolRunner>,
}

impl ToolInvoker {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemToolRunner::new()))
    }

    /// Runs the command; a nonzero exit becomes [`ToolError::ExitStatus`].
    pub async fn run_strict(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        let output = self.runner.run(command).await?;
        if !output.success() {
            return Err(ToolError::ExitStatus {
                program: command.program.clone(),
                code: output.code,
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }

    /// Runs the command; any failure is logged and returned as `None`.
    pub async fn run_lenient(&self, command: &ToolCommand) -> Option<ToolOutput> {
        match self.run_strict(command).await {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(program = %command.program, error = %e, "Tool call failed, continuing");
                None
            }
        }
    }
}
