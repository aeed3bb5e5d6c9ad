//! External command execution with timeouts.
//!
//! Collaborators (the encryption tool, git) are plain child processes. Their
//! exit status is the only success signal; output is captured so it can be
//! surfaced when they fail.

use crate::{error::RolloutError, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Program that ran.
    pub program: String,
    /// Exit status.
    pub status: ExitStatus,
    /// Stdout followed by stderr, lossily decoded.
    pub output: String,
}

impl CommandOutput {
    /// Returns true if the command exited with status zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Converts a non-zero exit into `RolloutError::CommandFailed`.
    pub fn checked(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(RolloutError::CommandFailed {
                program: self.program,
                status: self.status.to_string(),
                output: self.output,
            })
        }
    }
}

/// Where a captured command reads its standard input from.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    /// No input.
    Null,
    /// Contents of a file.
    File(&'a Path),
}

/// Runs external commands, killing any that outlive their timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    interactive_timeout: Option<Duration>,
}

impl CommandRunner {
    /// Creates a runner with a timeout for captured commands and an optional
    /// timeout for commands attached to the terminal.
    pub fn new(timeout: Duration, interactive_timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            interactive_timeout,
        }
    }

    /// Runs `program` in `cwd` and captures its output.
    ///
    /// A non-zero exit is not an error here; use [`CommandOutput::checked`]
    /// when it should be.
    ///
    /// # Errors
    ///
    /// - `RolloutError::Storage` if the input file cannot be opened
    /// - `RolloutError::CommandSpawn` if the program cannot be started
    /// - `RolloutError::CommandTimeout` if it runs past the timeout
    pub async fn capture(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        input: Input<'_>,
    ) -> Result<CommandOutput> {
        let stdin = match input {
            Input::Null => Stdio::null(),
            Input::File(path) => {
                let file = std::fs::File::open(path).map_err(|source| RolloutError::Storage {
                    path: path.to_path_buf(),
                    source,
                })?;
                Stdio::from(file)
            }
        };

        debug!(program, ?args, cwd = %cwd.display(), "running command");

        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env("LC_ALL", "C")
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| spawn_error(program, source))?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RolloutError::CommandTimeout {
                program: program.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| spawn_error(program, source))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        debug!(program, status = %output.status, "command finished");
        Ok(CommandOutput {
            program: program.to_string(),
            status: output.status,
            output: text,
        })
    }

    /// Runs `program` in `cwd` with the terminal attached.
    ///
    /// # Errors
    ///
    /// - `RolloutError::CommandSpawn` if the program cannot be started
    /// - `RolloutError::CommandTimeout` if an interactive timeout is set and
    ///   expires
    /// - `RolloutError::CommandFailed` on a non-zero exit (output went to the
    ///   terminal and is not captured)
    pub async fn interactive(&self, program: &str, args: &[&str], cwd: &Path) -> Result<()> {
        debug!(program, ?args, cwd = %cwd.display(), "running interactive command");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| spawn_error(program, source))?;

        let status = match self.interactive_timeout {
            Some(limit) => timeout(limit, child.wait())
                .await
                .map_err(|_| RolloutError::CommandTimeout {
                    program: program.to_string(),
                    timeout: limit,
                })?,
            None => child.wait().await,
        }
        .map_err(|source| spawn_error(program, source))?;

        if status.success() {
            Ok(())
        } else {
            Err(RolloutError::CommandFailed {
                program: program.to_string(),
                status: status.to_string(),
                output: String::new(),
            })
        }
    }
}

fn spawn_error(program: &str, source: std::io::Error) -> RolloutError {
    RolloutError::CommandSpawn {
        program: program.to_string(),
        source,
    }
}
