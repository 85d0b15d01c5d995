//! syncops - deployment and sync engine for web projects
//!
//! Drives git-based deployments, database dumps and media mirroring on
//! remote servers over a single SSH/SFTP connection per command.

pub mod backup;
pub mod commands;
pub mod config;
pub mod console;
pub mod db;
pub mod deploy;
pub mod error;
pub mod health;
pub mod local;
pub mod media;
pub mod project;
pub mod remote;
pub mod ssh;
pub mod validate;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use error::{Result, SyncOpsError};
pub use remote::RemoteExecutor;
