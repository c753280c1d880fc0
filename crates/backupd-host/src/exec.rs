//! `ToolCommand`: one bounded invocation of an external tool.
//!
//! Every backup step shells out to a CLI. Each invocation gets its own
//! working directory and environment (credentials are passed to the child
//! only, never set on this process) and a hard timeout after which the child
//! is killed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{HostError, Result};

/// Longest stderr excerpt carried into error values.
const MAX_STDERR_CHARS: usize = 2_000;

/// Captured result of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Tail of stderr, bounded for logs and notifications.
    pub fn stderr_excerpt(&self) -> String {
        let trimmed = self.stderr.trim();
        let count = trimmed.chars().count();
        if count <= MAX_STDERR_CHARS {
            return trimmed.to_string();
        }
        let tail: String = trimmed.chars().skip(count - MAX_STDERR_CHARS).collect();
        format!("…{tail}")
    }

    /// Convert a non-zero exit into [`HostError::CommandFailed`].
    pub fn check(self, program: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(HostError::CommandFailed {
                program: program.to_string(),
                code: self.exit_code,
                stderr: self.stderr_excerpt(),
            })
        }
    }
}

/// Builder for a single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: &[(String, String)]) -> Self {
        self.env.extend(vars.iter().cloned());
        self
    }

    /// Spawn the tool and wait for it, killing it if the timeout elapses.
    ///
    /// # Errors
    ///
    /// - `Spawn`: the binary could not be started.
    /// - `Timeout`: the child exceeded the time budget (it is killed).
    /// - `Io`: waiting on the child failed.
    ///
    /// A non-zero exit is *not* an error here; see [`ToolOutput::check`].
    pub async fn run(self) -> Result<ToolOutput> {
        debug!(program = %self.program, args = ?self.args, cwd = ?self.cwd, "exec");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|source| HostError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the `wait_with_output` future on timeout drops the child,
        // and `kill_on_drop` sends SIGKILL.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(HostError::Io(e)),
            Err(_elapsed) => Err(HostError::Timeout {
                program: self.program,
                secs: self.timeout.as_secs(),
            }),
        }
    }
}
