//! Static configuration checks.

use std::path::Path;

use crate::config::{BranchMain, ConnectionConfig, Settings};
use crate::error::{Result, SyncOpsError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub server: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Connections to validate: all of them, or only `server`.
pub fn select<'a>(
    settings: &'a Settings,
    server: Option<&str>,
) -> Result<Vec<(&'a str, &'a ConnectionConfig)>> {
    match server {
        Some(name) => {
            let (name, config) = settings
                .connections
                .get_key_value(name)
                .ok_or_else(|| SyncOpsError::UnknownServer(name.to_string()))?;
            Ok(vec![(name.as_str(), config)])
        }
        None => Ok(settings
            .connections
            .iter()
            .map(|(name, config)| (name.as_str(), config))
            .collect()),
    }
}

pub fn validate_connection(name: &str, config: &ConnectionConfig) -> ValidationReport {
    let mut report = ValidationReport {
        server: name.to_string(),
        ..Default::default()
    };
    let ssh = &config.ssh;

    if ssh.host.trim().is_empty() {
        report.errors.push(format!("'ssh.host' is required for '{name}'."));
    }
    if ssh.username.trim().is_empty() {
        report.errors.push(format!("'ssh.username' is required for '{name}'."));
    }

    let password = ssh.password.as_deref().is_some_and(|p| !p.is_empty());
    let key_path = ssh.key_path.as_deref().filter(|p| !p.as_os_str().is_empty());
    match key_path {
        None if !password => report.warnings.push(format!(
            "neither 'ssh.password' nor 'ssh.key_path' is set for '{name}'."
        )),
        Some(path) => {
            if let Some(problem) = key_file_problem(path) {
                report.warnings.push(format!(
                    "SSH key file {problem} at '{}' for '{name}'.",
                    path.display()
                ));
            }
        }
        None => {}
    }

    if config.project_path().is_none() {
        report.errors.push(format!("'project.path' is required for '{name}'."));
    }
    if matches!(&config.project.branch_main, BranchMain::Merge(b) if b.trim().is_empty()) {
        report
            .errors
            .push(format!("'project.branch_main' is an empty string for '{name}'."));
    }
    if config
        .project
        .branch_prod
        .as_deref()
        .is_some_and(|b| b.trim().is_empty())
    {
        report
            .errors
            .push(format!("'project.branch_prod' is an empty string for '{name}'."));
    }

    if let Some(db) = config.database.as_ref().filter(|db| !db.is_blank()) {
        for (key, value) in [
            ("database", &db.database),
            ("username", &db.username),
            ("password", &db.password),
        ] {
            if value.trim().is_empty() {
                report.warnings.push(format!(
                    "'database.{key}' is not set for '{name}' but database sync relies on it."
                ));
            }
        }
    }

    report
}

fn key_file_problem(path: &Path) -> Option<&'static str> {
    match std::fs::metadata(path) {
        Err(_) => Some("does not exist"),
        Ok(meta) if !meta.is_file() => Some("is not a regular file"),
        Ok(_) => std::fs::File::open(path).err().map(|_| "is not readable"),
    }
}
