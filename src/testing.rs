//! Scripted stand-ins for the remote and local runners.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SyncOpsError};
use crate::local::LocalCommands;
use crate::remote::command::redact;
use crate::remote::{Argv, RemoteCommands, RemoteFiles};

#[derive(Clone)]
enum Reply {
    Output(String),
    Fail {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
}

/// Replies to commands and records everything it was asked to do. Argument
/// vectors are keyed by their space-joined form so expectations stay
/// readable; quoting is covered by `remote::command`. Commands without a
/// scripted reply succeed with empty output. Failures mask secrets the way
/// the real executor does.
#[derive(Default)]
pub struct ScriptedRemote {
    server: String,
    replies: Mutex<HashMap<String, Reply>>,
    issued: Mutex<Vec<String>>,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            server: "production".to_string(),
            ..Default::default()
        }
    }

    /// A remote whose `git status --porcelain` reports local changes.
    pub fn dirty() -> Self {
        Self::new().on("git status --porcelain", " M app/config.php")
    }

    pub fn on(self, command: &str, stdout: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), Reply::Output(stdout.to_string()));
        self
    }

    pub fn fail(self, command: &str, stdout: &str, stderr: &str, exit_code: i32) -> Self {
        self.replies.lock().unwrap().insert(
            command.to_string(),
            Reply::Fail {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        );
        self
    }

    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.issued().iter().filter(|c| *c == command).count()
    }

    pub fn issued_any(&self, prefix: &str) -> bool {
        self.issued().iter().any(|c| c.starts_with(prefix))
    }

    fn respond(&self, command: String) -> Result<String> {
        self.issued.lock().unwrap().push(command.clone());
        let reply = self.replies.lock().unwrap().get(&command).cloned();
        match reply {
            None => Ok(String::new()),
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::Fail {
                stdout,
                stderr,
                exit_code,
            }) => Err(SyncOpsError::RemoteCommandFailed {
                server: self.server.clone(),
                command: redact(&command).into_owned(),
                stdout,
                stderr,
                exit_code,
            }),
        }
    }
}

#[async_trait]
impl RemoteCommands for ScriptedRemote {
    async fn run_and_get(&self, command: &[String]) -> Result<String> {
        Ok(self.respond(command.join(" "))?.trim().to_string())
    }

    async fn run_and_print(&self, commands: &[Argv]) -> Result<String> {
        let mut outputs = Vec::new();
        for command in commands {
            outputs.push(self.respond(command.join(" "))?.trim().to_string());
        }
        Ok(outputs.join("\n"))
    }

    async fn run_raw(&self, command: &str) -> Result<String> {
        self.respond(command.to_string())
    }
}

#[async_trait]
impl RemoteFiles for ScriptedRemote {
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let contents = std::fs::read(local)?;
        self.issued.lock().unwrap().push(format!("put {remote}"));
        self.files
            .lock()
            .unwrap()
            .insert(remote.to_string(), contents);
        Ok(())
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<()> {
        self.issued.lock().unwrap().push(format!("get {remote}"));
        let contents = self.files.lock().unwrap().get(remote).cloned();
        match contents {
            Some(bytes) => Ok(std::fs::write(local, bytes)?),
            None => Err(SyncOpsError::Transfer {
                server: self.server.clone(),
                message: format!("Failed to download file: {remote}"),
                source: anyhow::anyhow!("no such file"),
            }),
        }
    }

    async fn list_files_recursively(&self, remote_dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", remote_dir.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn remote_file_size(&self, remote_file: &str) -> Result<Option<u64>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(remote_file)
            .map(|b| b.len() as u64))
    }

    async fn remote_exists(&self, remote_path: &str) -> Result<bool> {
        let dir = format!("{}/", remote_path.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .any(|k| k == remote_path || k.starts_with(&dir)))
    }
}

/// Local runner counterpart of [`ScriptedRemote`]. Shell commands are
/// recorded verbatim, argument vectors space-joined.
#[derive(Default)]
pub struct ScriptedLocal {
    replies: Mutex<HashMap<String, Reply>>,
    issued: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<Option<Duration>>>,
}

impl ScriptedLocal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, command: &str, stdout: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), Reply::Output(stdout.to_string()));
        self
    }

    pub fn fail(self, command: &str, stderr: &str) -> Self {
        self.replies.lock().unwrap().insert(
            command.to_string(),
            Reply::Fail {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: 1,
            },
        );
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts.lock().unwrap().clone()
    }

    fn respond(&self, command: String) -> Result<String> {
        self.issued.lock().unwrap().push(command.clone());
        let reply = self.replies.lock().unwrap().get(&command).cloned();
        match reply {
            None => Ok(String::new()),
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::Fail {
                stderr, exit_code, ..
            }) => Err(SyncOpsError::LocalCommandFailed {
                command: redact(&command).into_owned(),
                exit_code: Some(exit_code),
                stderr,
            }),
        }
    }
}

#[async_trait]
impl LocalCommands for ScriptedLocal {
    async fn run_shell(&self, command: &str, timeout: Option<Duration>) -> Result<String> {
        self.timeouts.lock().unwrap().push(timeout);
        self.respond(command.to_string())
    }

    async fn run_args(&self, command: &[String]) -> Result<String> {
        self.timeouts.lock().unwrap().push(None);
        self.respond(command.join(" "))
    }
}
