//! Pull a remote MySQL/MariaDB database into the local one.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::config::DatabaseSettings;
use crate::console;
use crate::error::{Result, SyncOpsError};
use crate::local::LocalCommands;
use crate::remote::command::quote;
use crate::remote::{argv, RemoteCommands, RemoteFiles};

/// Builds `mysqldump`/`mysql` command lines. The password travels in
/// `MYSQL_PWD` and never appears as an argument.
pub struct MysqlCommandBuilder<'a> {
    db: &'a DatabaseSettings,
}

impl<'a> MysqlCommandBuilder<'a> {
    pub fn new(db: &'a DatabaseSettings) -> Self {
        Self { db }
    }

    fn env_prefix(&self) -> String {
        format!("MYSQL_PWD={}", quote(&self.db.password))
    }

    pub fn dump(&self, output: &str) -> String {
        let mut command = format!(
            "{} mysqldump --skip-comments --replace -u {} {}",
            self.env_prefix(),
            quote(&self.db.username),
            quote(&self.db.database),
        );
        for table in self.db.tables.iter().filter(|t| !t.trim().is_empty()) {
            command.push(' ');
            command.push_str(&quote(table.trim()));
        }
        command.push_str(" > ");
        command.push_str(&quote(output));
        command
    }

    /// Connectivity check with the given client binary (`mysql`/`mariadb`).
    pub fn select_one(&self, client: &str) -> String {
        format!(
            "{} {} -u {} -e 'SELECT 1' {}",
            self.env_prefix(),
            quote(client),
            quote(&self.db.username),
            quote(&self.db.database),
        )
    }

    pub fn import(&self, input: &Path) -> String {
        let input = input.to_string_lossy();
        format!(
            "{} mysql -u {} {} < {}",
            self.env_prefix(),
            quote(&self.db.username),
            quote(&self.db.database),
            quote(&input),
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct DbPullOptions {
    pub no_import: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DbPullOutcome {
    Imported,
    /// `--no-import`: the dump was kept at this path.
    Saved(PathBuf),
}

pub async fn pull<R>(
    remote: &R,
    local: &dyn LocalCommands,
    server: &str,
    remote_db: Option<&DatabaseSettings>,
    local_db: Option<&DatabaseSettings>,
    options: &DbPullOptions,
) -> Result<DbPullOutcome>
where
    R: RemoteCommands + RemoteFiles + ?Sized,
{
    let temp = tempfile::Builder::new()
        .prefix("db_pull_")
        .suffix(".sql")
        .tempfile()?
        .into_temp_path();
    pull_into(remote, local, server, remote_db, local_db, options, temp).await
}

async fn pull_into<R>(
    remote: &R,
    local: &dyn LocalCommands,
    server: &str,
    remote_db: Option<&DatabaseSettings>,
    local_db: Option<&DatabaseSettings>,
    options: &DbPullOptions,
    temp: TempPath,
) -> Result<DbPullOutcome>
where
    R: RemoteCommands + RemoteFiles + ?Sized,
{
    let remote_db = configured(remote_db)
        .ok_or_else(|| SyncOpsError::DatabaseNotConfigured(format!("server '{server}'")))?;
    let local_db = if options.no_import {
        None
    } else {
        let db = configured(local_db)
            .ok_or_else(|| SyncOpsError::DatabaseNotConfigured("the local project".to_string()))?;
        Some(db)
    };

    let file_name = temp
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "db_pull.sql".to_string());
    let remote_file = format!("/tmp/{file_name}");

    console::line("Creating remote database dump...");
    let dumped = remote
        .run_raw(&MysqlCommandBuilder::new(remote_db).dump(&remote_file))
        .await;
    // only clean up when the dump actually reached the server
    let reached_remote = matches!(
        &dumped,
        Ok(_) | Err(SyncOpsError::RemoteCommandFailed { .. })
    );

    let result = match dumped {
        Ok(_) => fetch_and_import(remote, local, &remote_file, &temp, local_db).await,
        Err(e) => Err(e),
    };

    console::line("Cleaning up temporary files...");
    if reached_remote {
        let cleanup = argv(["rm", "-f", remote_file.as_str()]);
        if let Err(e) = remote.run_and_get(&cleanup).await {
            log::warn!("[{}] removing {} failed: {}", server, remote_file, e);
        }
    }

    result?;
    if options.no_import {
        let kept = temp.keep().map_err(|e| SyncOpsError::Io(e.error))?;
        return Ok(DbPullOutcome::Saved(kept));
    }
    Ok(DbPullOutcome::Imported)
}

async fn fetch_and_import<R>(
    remote: &R,
    local: &dyn LocalCommands,
    remote_file: &str,
    local_file: &Path,
    local_db: Option<&DatabaseSettings>,
) -> Result<()>
where
    R: RemoteCommands + RemoteFiles + ?Sized,
{
    console::line("Downloading database dump via SFTP...");
    remote.download_file(remote_file, local_file).await?;
    console::success("Database dump successfully downloaded.");

    if let Some(db) = local_db {
        console::line("Importing local database...");
        local
            .run_shell(&MysqlCommandBuilder::new(db).import(local_file), None)
            .await?;
        console::success("Database imported successfully.");
    }
    Ok(())
}

fn configured(db: Option<&DatabaseSettings>) -> Option<&DatabaseSettings> {
    db.filter(|db| !db.database.trim().is_empty())
}
