//! Error taxonomy shared by every syncops operation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = SyncOpsError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SyncOpsError {
    #[error("unable to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no configuration found for server '{0}'")]
    UnknownServer(String),

    #[error("no SSH password or key_path configured for server '{server}'")]
    NoCredentialConfigured { server: String },

    #[error(
        "SSH key file not found or unreadable at {} for server '{server}': {source}",
        path.display()
    )]
    CredentialUnreadable {
        server: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no database settings configured for {0}")]
    DatabaseNotConfigured(String),

    #[error("project path is not defined for server '{0}'")]
    PathNotConfigured(String),

    #[error("remote command failed on [{server}]:\nCommand: {command}\nError: {stderr}")]
    RemoteCommandFailed {
        server: String,
        command: String,
        stdout: String,
        stderr: String,
        exit_code: i32,
    },

    #[error("remote changes detected on '{server}'; run `syncops project-pull {server}` first")]
    RemoteNotClean { server: String },

    #[error("merge conflict on '{server}'; changes were reverted with `git reset --hard`")]
    MergeConflictDetected { server: String },

    #[error("local command failed: {command}\n{stderr}")]
    LocalCommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("local command timed out after {}s: {command}", timeout.as_secs())]
    LocalCommandTimedOut { command: String, timeout: Duration },

    #[error("configuration validation found {0} problem(s)")]
    ValidationFailed(usize),

    #[error("invalid timestamp format '{0}'")]
    InvalidTimestampFormat(String),

    #[error("SSH connection to {host}:{port} failed: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: anyhow::Error,
    },

    #[error("SSH login failed for server: {host}")]
    Authentication { host: String },

    #[error("[{server}] {message}: {source}")]
    Transfer {
        server: String,
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncOpsError {
    /// Everything the remote side printed for a failed command, stdout first.
    pub fn remote_output(&self) -> Option<String> {
        match self {
            SyncOpsError::RemoteCommandFailed { stdout, stderr, .. } => {
                Some(format!("{stdout}\n{stderr}"))
            }
            _ => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SyncOpsError::LocalCommandFailed { .. } | SyncOpsError::LocalCommandTimedOut { .. }
        )
    }
}
