//! Native toolchain invocation.
//!
//! Steps describe what to run as an [`Invocation`]; a [`CommandRunner`]
//! runs it. [`ProcessRunner`] spawns real processes, streaming stdout to the
//! log while capturing both streams for diagnostics.

use super::Step;
use crate::error::{CliError, ReleaseError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Captured output lines kept per stream.
const MAX_CAPTURED_LINES: usize = 400;

/// A fully described external command.
#[derive(Clone)]
pub struct Invocation {
    /// Step this command belongs to.
    pub step: Step,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment. May hold secrets; `Debug` prints keys only.
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(step: Step, program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            step,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: cwd.into(),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Program name plus arguments, for logs and error messages.
    pub fn display_command(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        std::iter::once(program)
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Short tool label: program plus first argument.
    pub fn tool(&self) -> String {
        let mut parts = self.display_command();
        if let Some(second_space) = parts.match_indices(' ').nth(1).map(|(i, _)| i) {
            parts.truncate(second_space);
        }
        parts
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("step", &self.step)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("cwd", &self.cwd)
            .finish()
    }
}

/// What a finished command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn status_label(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }

    /// Diagnostic text for errors: stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        }
    }

    /// Convert a failed build command into a [`ReleaseError::Toolchain`].
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(ReleaseError::Toolchain {
                tool: invocation.tool(),
                status: self.status_label(),
                diagnostic: self.diagnostic(),
            })
        }
    }
}

/// Runs external commands for lane steps.
///
/// Implementations return `Ok` for any command that ran, successful or not;
/// `Err` means the command could not be started at all.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Spawns real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn resolve_program(program: &Path) -> Result<PathBuf> {
        if program.components().count() > 1 {
            return Ok(program.to_path_buf());
        }
        super::tool_detection::locate(program).ok_or_else(|| ReleaseError::Toolchain {
            tool: program.display().to_string(),
            status: "not found".to_string(),
            diagnostic: format!("{} is not installed or not on PATH", program.display()),
        })
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let program = Self::resolve_program(&invocation.program)?;
        log::info!("$ {}", invocation.display_command());

        let mut child = Command::new(&program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReleaseError::Cli(CliError::ExecutionFailed {
                    command: invocation.display_command(),
                    reason: e.to_string(),
                })
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both pipes concurrently so neither can fill up and stall the child.
        let (stdout_lines, stderr_lines) = tokio::join!(
            async move {
                match stdout {
                    Some(stdout) => drain(stdout, "").await,
                    None => VecDeque::new(),
                }
            },
            async move {
                match stderr {
                    Some(stderr) => drain(stderr, "stderr: ").await,
                    None => VecDeque::new(),
                }
            }
        );

        let status = child.wait().await.map_err(|e| {
            ReleaseError::Cli(CliError::ExecutionFailed {
                command: invocation.display_command(),
                reason: e.to_string(),
            })
        })?;

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: Vec::from(stdout_lines).join("\n"),
            stderr: Vec::from(stderr_lines).join("\n"),
        })
    }
}

/// Read a pipe to EOF, line by line.
///
/// Lines are decoded lossily. A read error stops capturing, and the rest of
/// the pipe is discarded so the child never writes into a closed pipe.
async fn drain<R: AsyncRead + Unpin>(pipe: R, prefix: &str) -> VecDeque<String> {
    let mut reader = BufReader::new(pipe);
    let mut captured = VecDeque::with_capacity(MAX_CAPTURED_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                log::debug!("{prefix}{line}");
                push_bounded(&mut captured, line);
            }
            Err(e) => {
                log::warn!("{prefix}output capture stopped: {e}");
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
    }
    captured
}

/// Keep the most recent lines; build logs can run to hundreds of thousands.
fn push_bounded(lines: &mut VecDeque<String>, line: String) {
    if lines.len() == MAX_CAPTURED_LINES {
        lines.pop_front();
    }
    lines.push_back(line);
}
