use std::path::Path;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{Argv, CommandResult, RemoteCommands, RemoteFiles, RemoteShell, SecureCommandExecutor};
use crate::config::{ConnectionConfig, Settings};
use crate::error::{Result, SyncOpsError};
use crate::ssh::session::SshSession;
use crate::ssh::sftp::SftpClient;
use crate::ssh::SshTarget;

/// Per-server facade holding at most one SSH connection and one SFTP
/// session. Both are opened on first use and released by [`close`].
///
/// [`close`]: RemoteExecutor::close
pub struct RemoteExecutor {
    server: String,
    config: ConnectionConfig,
    target: SshTarget,
    ssh: OnceCell<SshSession>,
    sftp: OnceCell<SftpClient>,
}

impl RemoteExecutor {
    /// Resolve the credential for `server`. No network I/O happens here.
    pub fn new(server: &str, config: ConnectionConfig) -> Result<Self> {
        let target = SshTarget::from_settings(server, &config.ssh)?;
        Ok(Self {
            server: server.to_string(),
            config,
            target,
            ssh: OnceCell::new(),
            sftp: OnceCell::new(),
        })
    }

    pub fn from_settings(settings: &Settings, server: &str) -> Result<Self> {
        Self::new(server, settings.connection(server)?.clone())
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.ssh.get().is_some_and(SshSession::is_connected)
    }

    async fn session(&self) -> Result<&SshSession> {
        self.ssh
            .get_or_try_init(|| async {
                let mut session = SshSession::new(self.target.clone());
                session.connect().await?;
                Ok::<_, SyncOpsError>(session)
            })
            .await
    }

    async fn sftp(&self) -> Result<&SftpClient> {
        self.sftp
            .get_or_try_init(|| async {
                let channel = self
                    .session()
                    .await?
                    .open_sftp_channel()
                    .await
                    .map_err(|e| self.transfer_error("Unable to open SFTP channel", e))?;
                let mut client = SftpClient::new();
                client
                    .init(channel)
                    .await
                    .map_err(|e| self.transfer_error("SFTP login failed", e))?;
                log::info!("SFTP session opened on {}", self.target.host);
                Ok::<_, SyncOpsError>(client)
            })
            .await
    }

    /// Establish both sessions now instead of on first use.
    pub async fn connect_both(&self) -> Result<()> {
        self.session().await?;
        self.sftp().await?;
        Ok(())
    }

    fn commands(&self) -> SecureCommandExecutor<'_, Self> {
        SecureCommandExecutor::new(&self.server, self.config.project_path(), self)
    }

    /// Close the SFTP session and the SSH connection. Safe to call when
    /// nothing was ever opened; failures are logged, not returned.
    pub async fn close(&mut self) {
        if let Some(mut sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                log::warn!("SFTP close on [{}] failed: {}", self.server, e);
            }
        }
        if let Some(mut ssh) = self.ssh.take() {
            if let Err(e) = ssh.disconnect().await {
                log::warn!("SSH disconnect on [{}] failed: {}", self.server, e);
            }
        }
    }

    fn transfer_error(&self, message: impl Into<String>, source: anyhow::Error) -> SyncOpsError {
        SyncOpsError::Transfer {
            server: self.server.clone(),
            message: message.into(),
            source,
        }
    }
}

#[async_trait]
impl RemoteShell for RemoteExecutor {
    async fn exec(&self, command: &str) -> Result<CommandResult> {
        let session = self.session().await?;
        session
            .exec(command)
            .await
            .map_err(|source| SyncOpsError::Connection {
                host: self.target.host.clone(),
                port: self.target.port,
                source,
            })
    }
}

#[async_trait]
impl RemoteCommands for RemoteExecutor {
    async fn run_and_get(&self, command: &[String]) -> Result<String> {
        self.commands().run_and_get(command).await
    }

    async fn run_and_print(&self, commands: &[Argv]) -> Result<String> {
        self.commands().run_and_print(commands).await
    }

    async fn run_raw(&self, command: &str) -> Result<String> {
        self.commands().run_raw(command).await
    }
}

#[async_trait]
impl RemoteFiles for RemoteExecutor {
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        self.sftp().await?.upload(local, remote).await.map_err(|e| {
            self.transfer_error(
                format!("Failed to upload file: {} -> {}", local.display(), remote),
                e,
            )
        })
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<()> {
        self.sftp()
            .await?
            .download(remote, local)
            .await
            .map_err(|e| self.transfer_error(format!("Failed to download file: {}", remote), e))
    }

    async fn list_files_recursively(&self, remote_dir: &str) -> Result<Vec<String>> {
        self.sftp()
            .await?
            .list_files_recursively(remote_dir)
            .await
            .map_err(|e| self.transfer_error(format!("Failed to list {}", remote_dir), e))
    }

    async fn remote_file_size(&self, remote_file: &str) -> Result<Option<u64>> {
        self.sftp()
            .await?
            .file_size(remote_file)
            .await
            .map_err(|e| self.transfer_error(format!("Failed to stat {}", remote_file), e))
    }

    async fn remote_exists(&self, remote_path: &str) -> Result<bool> {
        self.sftp()
            .await?
            .exists(remote_path)
            .await
            .map_err(|e| self.transfer_error(format!("Failed to check {}", remote_path), e))
    }
}
