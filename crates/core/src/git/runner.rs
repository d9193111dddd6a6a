//! Abstract invocation of the external `git` binary.
//!
//! The detection engine depends only on the [`GitRunner`] trait, so tests can
//! substitute an implementation that returns scripted outputs and exit codes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::GitError;

/// Wall-clock bound on any single git invocation.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on captured bytes per stream.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Capability for running the external git binary inside the watched
/// repository. Implementations must bound both wait time and captured
/// output size; exceeding either is a failure, never a hang.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, GitError>;
}

// ---------------------------------------------------------------------------
// Process-backed implementation
// ---------------------------------------------------------------------------

/// Real implementation spawning `git` in a fixed working directory.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    repo_path: PathBuf,
    timeout: Duration,
    max_output: usize,
}

impl ProcessRunner {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            timeout: COMMAND_TIMEOUT,
            max_output: MAX_OUTPUT_BYTES,
        }
    }

    /// Override the wall-clock bound (primarily for tests).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the per-stream output cap (primarily for tests).
    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }
}

#[async_trait]
impl GitRunner for ProcessRunner {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, GitError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out process must not linger.
            .kill_on_drop(true);

        debug!(cmd = %format!("git {}", args.join(" ")), "running git command");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::BinaryNotFound("git".into())
                } else {
                    GitError::IoError(e)
                }
            })?,
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    cmd = %format!("git {}", args.join(" ")),
                    "git command timed out"
                );
                return Err(GitError::Timeout(self.timeout.as_secs()));
            }
        };

        if output.stdout.len() > self.max_output || output.stderr.len() > self.max_output {
            return Err(GitError::OutputTooLarge {
                limit: self.max_output,
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
