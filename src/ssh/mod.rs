pub mod session;
pub mod sftp;

use std::fmt;

use crate::config::SshSettings;
use crate::error::{Result, SyncOpsError};

/// Everything needed to open an authenticated SSH connection.
#[derive(Clone, Debug)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

/// SSH authentication material, resolved once when the target is built.
#[derive(Clone)]
pub enum Credential {
    Password(String),
    PrivateKey {
        material: String,
        passphrase: Option<String>,
    },
}

// Keep secrets out of logs and panics.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::PrivateKey { .. } => f.write_str("PrivateKey(***)"),
        }
    }
}

impl Credential {
    /// Resolve the credential for `server`. A configured key path wins over
    /// a password; the key file is read here, not on every connect.
    pub fn resolve(server: &str, ssh: &SshSettings) -> Result<Credential> {
        let key_path = ssh
            .key_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());

        if let Some(path) = key_path {
            let material = std::fs::read_to_string(path).map_err(|source| {
                SyncOpsError::CredentialUnreadable {
                    server: server.to_string(),
                    path: path.clone(),
                    source,
                }
            })?;
            return Ok(Credential::PrivateKey {
                material,
                passphrase: ssh.key_passphrase.clone().filter(|p| !p.is_empty()),
            });
        }

        match ssh.password.as_deref() {
            Some(password) if !password.is_empty() => {
                Ok(Credential::Password(password.to_string()))
            }
            _ => Err(SyncOpsError::NoCredentialConfigured {
                server: server.to_string(),
            }),
        }
    }
}

impl SshTarget {
    pub fn from_settings(server: &str, ssh: &SshSettings) -> Result<Self> {
        Ok(Self {
            host: ssh.host.clone(),
            port: ssh.port,
            username: ssh.username.clone(),
            credential: Credential::resolve(server, ssh)?,
        })
    }
}
