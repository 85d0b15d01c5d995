//! Local process execution with timeouts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::LocalSettings;
use crate::error::{Result, SyncOpsError};
use crate::remote::command::redact;
use crate::remote::render_command;

/// Local command execution as the pull/push/backup workflows see it.
#[async_trait]
pub trait LocalCommands: Send + Sync {
    /// Run a shell command line (`sh -c`). `timeout` overrides the default.
    async fn run_shell(&self, command: &str, timeout: Option<Duration>) -> Result<String>;

    /// Run a program with arguments, no shell involved.
    async fn run_args(&self, command: &[String]) -> Result<String>;
}

pub struct LocalCommandRunner {
    root: PathBuf,
    timeout: Duration,
}

impl LocalCommandRunner {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    /// Budget for creating project archives.
    pub const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(3600);

    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    pub fn from_settings(local: &LocalSettings) -> Self {
        Self::new(
            local.project_root.clone(),
            Duration::from_secs(local.timeout_secs.max(1)),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn execute(
        &self,
        mut cmd: Command,
        display: String,
        timeout: Duration,
    ) -> Result<String> {
        cmd.current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        log::debug!("local: {} (timeout {}s)", display, timeout.as_secs());

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SyncOpsError::LocalCommandFailed {
                    command: display,
                    exit_code: None,
                    stderr: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SyncOpsError::LocalCommandTimedOut {
                    command: display,
                    timeout,
                })
            }
        };

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                // git reports some failures (e.g. "nothing to commit") on stdout
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(SyncOpsError::LocalCommandFailed {
                command: display,
                exit_code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LocalCommands for LocalCommandRunner {
    async fn run_shell(&self, command: &str, timeout: Option<Duration>) -> Result<String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        self.execute(cmd, redact(command).into_owned(), timeout.unwrap_or(self.timeout))
            .await
    }

    async fn run_args(&self, command: &[String]) -> Result<String> {
        let Some((program, args)) = command.split_first() else {
            return Ok(String::new());
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        self.execute(cmd, render_command(command), self.timeout).await
    }
}
