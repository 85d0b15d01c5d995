use super::{Credential, SshTarget};
use crate::error::{Result, SyncOpsError};
use crate::remote::command::redact;
use crate::remote::CommandResult;
use russh::keys::*;
use russh::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One authenticated SSH connection.
pub struct SshSession {
    target: SshTarget,
    handle: Option<Arc<Mutex<client::Handle<SshHandler>>>>,
}

/// Client handler that checks the server key against `~/.ssh/known_hosts`.
struct SshHandler {
    host: String,
    port: u16,
}

impl client::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        match check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) => {
                log::warn!(
                    "Host key for {}:{} is not in known_hosts, accepting it",
                    self.host,
                    self.port
                );
                Ok(true)
            }
            Err(russh::keys::Error::KeyChanged { line }) => {
                log::error!(
                    "Host key for {}:{} does not match known_hosts line {}",
                    self.host,
                    self.port,
                    line
                );
                Ok(false)
            }
            Err(e) => {
                log::warn!("Unable to read known_hosts ({}), accepting host key", e);
                Ok(true)
            }
        }
    }
}

impl SshSession {
    pub fn new(target: SshTarget) -> Self {
        Self {
            target,
            handle: None,
        }
    }

    /// Establish and authenticate the SSH connection.
    pub async fn connect(&mut self) -> Result<()> {
        let ssh_config = client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let handler = SshHandler {
            host: self.target.host.clone(),
            port: self.target.port,
        };

        let mut session = client::connect(
            Arc::new(ssh_config),
            (self.target.host.as_str(), self.target.port),
            handler,
        )
        .await
        .map_err(|e| self.connection_error(e))?;

        let result = match &self.target.credential {
            Credential::Password(password) => {
                session
                    .authenticate_password(&self.target.username, password)
                    .await
            }
            Credential::PrivateKey {
                material,
                passphrase,
            } => {
                let key_pair = decode_secret_key(material, passphrase.as_deref())
                    .map_err(|e| self.connection_error(e.into()))?;
                let pk = PrivateKeyWithHashAlg::new(Arc::new(key_pair), None);
                session
                    .authenticate_publickey(&self.target.username, pk)
                    .await
            }
        }
        .map_err(|e| self.connection_error(e.into()))?;

        match result {
            client::AuthResult::Success => {}
            client::AuthResult::Failure { .. } => {
                return Err(SyncOpsError::Authentication {
                    host: self.target.host.clone(),
                });
            }
        }

        self.handle = Some(Arc::new(Mutex::new(session)));
        log::info!("SSH connected to {}:{}", self.target.host, self.target.port);
        Ok(())
    }

    /// Run one command on a fresh exec channel and capture everything it
    /// produced.
    pub async fn exec(&self, command: &str) -> anyhow::Result<CommandResult> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Not connected"))?;

        let handle = handle.lock().await;
        let mut channel = handle.channel_open_session().await?;
        log::debug!("exec: {}", redact(command));
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code: Option<i32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        let _ = channel.close().await;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            // A channel closed without an exit status counts as a failure.
            exit_code: exit_code.unwrap_or(-1),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Open a channel with the `sftp` subsystem requested.
    pub async fn open_sftp_channel(&self) -> anyhow::Result<Channel<client::Msg>> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Not connected"))?;

        let handle = handle.lock().await;
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        Ok(channel)
    }

    /// Disconnect the SSH session.
    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        if let Some(handle) = self.handle.take() {
            let h = handle.lock().await;
            h.disconnect(Disconnect::ByApplication, "syncops done", "en")
                .await?;
            log::info!("SSH disconnected from {}", self.target.host);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    fn connection_error(&self, source: anyhow::Error) -> SyncOpsError {
        SyncOpsError::Connection {
            host: self.target.host.clone(),
            port: self.target.port,
            source,
        }
    }
}
