//! Host tool invocation with captured output.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Output of a finished host tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Raw stdout
    pub stdout: Vec<u8>,
    /// Stderr, lossily decoded
    pub stderr: String,
}

impl ToolOutput {
    /// Stdout, lossily decoded.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Why a host tool invocation failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// The program could not be started
    #[error("Failed to execute '{program}'. Is it installed? {message}")]
    Spawn {
        /// Program name
        program: String,
        /// OS error text
        message: String,
    },
    /// The program exited non-zero
    #[error("'{command}' failed (exit code {code}): {stderr}")]
    Failed {
        /// Command line
        command: String,
        /// Exit code
        code: i32,
        /// Trimmed stderr
        stderr: String,
    },
    /// The program did not finish in time and was killed
    #[error("'{command}' timed out after {timeout:?}")]
    TimedOut {
        /// Command line
        command: String,
        /// Limit that elapsed
        timeout: Duration,
    },
}

/// Builder for one host tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    isolated: bool,
}

impl ToolCommand {
    /// Start building an invocation of `program`.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            current_dir: None,
            timeout: None,
            isolated: false,
        }
    }

    /// Add one argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    /// Add a path argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Run in `dir`.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Kill the process if it runs longer than `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Start from an empty environment, keeping only `PATH`.
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    /// Command line for logs and errors.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the tool and capture its output.
    ///
    /// # Errors
    ///
    /// Fails if the tool cannot be started, times out, or exits non-zero.
    pub async fn run(self) -> Result<ToolOutput, ToolError> {
        let command_line = self.display();
        trace!(command = %command_line, "Running host tool");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        if self.isolated {
            cmd.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }

        let child = cmd.spawn().map_err(|e| ToolError::Spawn {
            program: self.program.display().to_string(),
            message: e.to_string(),
        })?;

        let waited = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, waited).await {
                Ok(output) => output,
                Err(_elapsed) => {
                    return Err(ToolError::TimedOut {
                        command: command_line,
                        timeout: limit,
                    });
                }
            },
            None => waited.await,
        }
        .map_err(|e| ToolError::Spawn {
            program: self.program.display().to_string(),
            message: e.to_string(),
        })?;

        let result = ToolOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.status.success() {
            return Err(ToolError::Failed {
                command: command_line,
                code: result.code(),
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}
