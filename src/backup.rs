//! Local project archives.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::console;
use crate::error::{Result, SyncOpsError};
use crate::local::{LocalCommandRunner, LocalCommands};
use crate::remote::{render_command, Argv};

pub const DEFAULT_FOLDER: &str = "backup";
pub const DEFAULT_TIMESTAMP: &str = "%Y-%m-%d_%H-%M-%S";

const DEFAULT_EXCLUDES: [&str; 2] = ["storage/framework/cache", "vendor"];

#[derive(Clone, Debug, Default)]
pub struct BackupOptions {
    pub folder: Option<String>,
    /// `strftime` format for the archive name.
    pub timestamp: Option<String>,
    /// Comma-separated extra exclusions.
    pub exclude: Option<String>,
}

impl BackupOptions {
    fn folder(&self) -> &str {
        self.folder
            .as_deref()
            .map(|f| f.trim().trim_end_matches(['/', '\\']))
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FOLDER)
    }

    fn timestamp(&self) -> &str {
        self.timestamp
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TIMESTAMP)
    }
}

/// `<timestamp>.tar.gz`, formatted from `now`.
pub fn archive_name<Tz>(format: &str, now: &DateTime<Tz>) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut name = String::new();
    write!(name, "{}", now.format(format))
        .map_err(|_| SyncOpsError::InvalidTimestampFormat(format.to_string()))?;
    if name.trim().is_empty() {
        return Err(SyncOpsError::InvalidTimestampFormat(format.to_string()));
    }
    name.push_str(".tar.gz");
    Ok(name)
}

/// Backup folder, the defaults, then `extra` (comma-separated); trimmed,
/// de-duplicated, order kept.
pub fn exclude_list(folder: &str, extra: Option<&str>) -> Vec<String> {
    let extra = extra.unwrap_or("").split(',');
    let mut list: Vec<String> = Vec::new();
    for item in [folder].into_iter().chain(DEFAULT_EXCLUDES).chain(extra) {
        let item = item.trim();
        if !item.is_empty() && !list.iter().any(|e| e == item) {
            list.push(item.to_string());
        }
    }
    list
}

pub fn tar_command(archive: &str, excludes: &[String]) -> Argv {
    let mut command = vec!["tar".to_string(), "-pczf".to_string(), archive.to_string()];
    command.extend(excludes.iter().map(|e| format!("--exclude={e}")));
    command.push(".".to_string());
    command
}

/// Archive the project at `root`. Returns the archive path relative to it.
pub async fn create<Tz>(
    local: &dyn LocalCommands,
    root: &Path,
    options: &BackupOptions,
    now: &DateTime<Tz>,
) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let folder = options.folder();
    let archive = format!("{}/{}", folder, archive_name(options.timestamp(), now)?);

    tokio::fs::create_dir_all(root.join(folder)).await?;

    console::line(format!("Creating project archive ({archive})..."));
    let command = tar_command(&archive, &exclude_list(folder, options.exclude.as_deref()));
    local
        .run_shell(
            &render_command(&command),
            Some(LocalCommandRunner::ARCHIVE_TIMEOUT),
        )
        .await?;

    Ok(PathBuf::from(archive))
}
