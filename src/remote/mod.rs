//! Remote command execution.
//!
//! [`command::SecureCommandExecutor`] turns argument vectors into quoted
//! shell strings and enforces the exit-status contract on top of any
//! [`RemoteShell`]. [`executor::RemoteExecutor`] is the per-server facade
//! that owns the SSH and SFTP sessions.

pub mod command;
pub mod executor;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use command::{argv, render_command, SecureCommandExecutor};
pub use executor::RemoteExecutor;

/// A command as a list of arguments, program first.
pub type Argv = Vec<String>;

/// Everything one remote command produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub exit_code: i32,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can run a fully composed shell string.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str) -> Result<CommandResult>;
}

/// Command operations the deploy and sync workflows rely on.
#[async_trait]
pub trait RemoteCommands: Send + Sync {
    /// Run a single command and return its trimmed output.
    async fn run_and_get(&self, command: &[String]) -> Result<String>;

    /// Run commands in order, echoing each output to the operator.
    async fn run_and_print(&self, commands: &[Argv]) -> Result<String>;

    /// Run a trusted raw shell string in the project directory.
    async fn run_raw(&self, command: &str) -> Result<String>;

    /// True when `git status --porcelain` prints nothing.
    async fn is_remote_clean(&self) -> Result<bool> {
        let status = self
            .run_and_get(&argv(["git", "status", "--porcelain"]))
            .await?;
        Ok(status.is_empty())
    }
}

/// File transfer operations.
#[async_trait]
pub trait RemoteFiles: Send + Sync {
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;
    async fn download_file(&self, remote: &str, local: &Path) -> Result<()>;
    async fn list_files_recursively(&self, remote_dir: &str) -> Result<Vec<String>>;
    async fn remote_file_size(&self, remote_file: &str) -> Result<Option<u64>>;
    /// True when a file or directory exists at `remote_path`.
    async fn remote_exists(&self, remote_path: &str) -> Result<bool>;
}
