//! Command handlers behind the CLI. Each remote command opens one
//! [`RemoteExecutor`] and closes it on every path before returning.

use std::path::Path;

use crate::backup::{self, BackupOptions};
use crate::config::Settings;
use crate::console;
use crate::db::{self, DbPullOptions, DbPullOutcome};
use crate::deploy::{DeployOptions, Deployment};
use crate::error::{Result, SyncOpsError};
use crate::health;
use crate::local::LocalCommandRunner;
use crate::media::{self, MediaPullOptions};
use crate::project::{self, PullOptions, PullOutcome, PushOutcome};
use crate::remote::{argv, Argv, RemoteCommands, RemoteExecutor};
use crate::validate;

fn connect(settings: &Settings, server: &str) -> Result<RemoteExecutor> {
    console::line(format!("Connecting to remote server '{server}'..."));
    RemoteExecutor::from_settings(settings, server)
}

pub async fn project_deploy(
    settings: &Settings,
    server: &str,
    options: DeployOptions,
) -> Result<()> {
    let mut executor = connect(settings, server)?;
    let result = {
        let mut deployment = Deployment::new(
            &executor,
            server,
            executor.config(),
            &settings.deploy,
            options,
        );
        let result = deployment.run().await;
        log::debug!(
            "deploy trace: {}",
            deployment
                .trace()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        result
    };
    executor.close().await;

    match result?.into_result(server) {
        Ok(()) => {
            console::success("Project was successfully deployed.");
            Ok(())
        }
        Err(e) => {
            console::failure("Project deployment FAILED.");
            Err(e)
        }
    }
}

pub async fn project_pull(settings: &Settings, server: &str, options: PullOptions) -> Result<()> {
    let mut executor = connect(settings, server)?;
    let local = LocalCommandRunner::from_settings(&settings.local);
    let result = project::pull(&executor, &local, &options).await;
    executor.close().await;

    match result? {
        PullOutcome::NoChanges => console::success("No changes on the remote server."),
        PullOutcome::Pushed { merged: true, .. } => {
            console::success("Changes were successfully pulled into the local project.")
        }
        PullOutcome::Pushed { branch, .. } => {
            console::success(format!("Remote changes were pushed to origin/{branch}."))
        }
    }
    Ok(())
}

pub async fn project_push(settings: &Settings, message: Option<&str>) -> Result<()> {
    let local = LocalCommandRunner::from_settings(&settings.local);
    match project::push(&local, message).await? {
        PushOutcome::NoChanges => {
            console::success("No changes to commit. Everything is up-to-date.")
        }
        PushOutcome::Pushed => console::success("Project changes were successfully pushed."),
    }
    Ok(())
}

pub async fn db_pull(settings: &Settings, server: &str, options: DbPullOptions) -> Result<()> {
    let mut executor = connect(settings, server)?;
    let local = LocalCommandRunner::from_settings(&settings.local);
    let remote_db = executor.config().database.clone();
    let result = db::pull(
        &executor,
        &local,
        server,
        remote_db.as_ref(),
        settings.local.database.as_ref(),
        &options,
    )
    .await;
    executor.close().await;

    match result? {
        DbPullOutcome::Imported => {
            console::success("Database was successfully pulled and imported.")
        }
        DbPullOutcome::Saved(path) => console::success(format!(
            "Database dump was successfully saved to: {}",
            path.display()
        )),
    }
    Ok(())
}

pub async fn media_pull(
    settings: &Settings,
    server: &str,
    options: MediaPullOptions,
) -> Result<()> {
    let mut executor = connect(settings, server)?;
    let Some(project_path) = executor.config().project_path().map(str::to_string) else {
        return Err(SyncOpsError::PathNotConfigured(server.to_string()));
    };
    let remote_root = media::remote_media_dir(&project_path);
    let local_root = settings.local.project_root.join(media::MEDIA_DIR);

    let result = media::pull(&executor, &remote_root, &local_root, &options).await;
    executor.close().await;

    let report = result?;
    if report.downloaded == 0 && report.skipped == 0 {
        console::success("No media files found on remote server.");
    } else {
        console::success(format!(
            "Media files successfully synced from remote server ({} downloaded, {} skipped).",
            report.downloaded, report.skipped
        ));
    }
    Ok(())
}

pub async fn project_backup(settings: &Settings, options: BackupOptions) -> Result<()> {
    let local = LocalCommandRunner::from_settings(&settings.local);
    let now = chrono::Local::now();
    let archive = backup::create(&local, &settings.local.project_root, &options, &now).await?;
    console::success(format!(
        "Project backup was successfully created: {}",
        archive.display()
    ));
    Ok(())
}

/// `php artisan <args...>`
pub fn artisan_command(args: &[String]) -> Argv {
    let mut command = argv(["php", "artisan"]);
    command.extend_from_slice(args);
    command
}

pub async fn remote_artisan(settings: &Settings, server: &str, args: &[String]) -> Result<()> {
    let mut executor = connect(settings, server)?;
    let command = artisan_command(args);
    console::line(format!("Running '{}' on '{server}':", command.join(" ")));
    let result = executor.run_and_print(&[command]).await;
    executor.close().await;

    result?;
    console::success("Remote artisan command completed.");
    Ok(())
}

pub async fn remote_health(
    settings: &Settings,
    server: &str,
    full: bool,
    json: bool,
) -> Result<()> {
    let mut executor = RemoteExecutor::from_settings(settings, server)?;
    let database = executor.config().database.clone();
    let report = health::check(&executor, server, database.as_ref(), full).await;
    executor.close().await;

    if json {
        let rendered = report.to_json().map_err(|e| SyncOpsError::Io(e.into()))?;
        console::line(rendered);
        return Ok(());
    }

    console::line(format!("Remote health for '{server}':"));
    console::blank();
    print!("{}", report.render());
    match report.warnings() {
        0 => console::success(format!("Remote health check completed for '{server}'.")),
        n => console::warn(format!(
            "Remote health check completed for '{server}' with {n} warning(s)."
        )),
    }
    Ok(())
}

pub async fn validate(
    settings: &Settings,
    origin: &Path,
    server: Option<&str>,
    connect: bool,
) -> Result<()> {
    if settings.connections.is_empty() {
        console::failure(format!("No connections defined in {}.", origin.display()));
        return Err(SyncOpsError::ValidationFailed(1));
    }

    let mut problems = 0;
    for (name, config) in validate::select(settings, server)? {
        console::line(format!("Validating server '{name}'..."));
        let report = validate::validate_connection(name, config);
        for error in &report.errors {
            console::failure(format!("  {error}"));
        }
        for warning in &report.warnings {
            console::warn(format!("  {warning}"));
        }
        problems += report.errors.len();

        if !report.is_valid() {
            console::blank();
            continue;
        }
        console::success(format!("  Static configuration looks valid for '{name}'."));

        if connect {
            console::line(format!("  Testing SSH connectivity for '{name}'..."));
            match RemoteExecutor::new(name, config.clone()) {
                Ok(mut executor) => {
                    match executor.connect_both().await {
                        Ok(()) => console::success(format!("  SSH connectivity OK for '{name}'.")),
                        Err(e) => {
                            problems += 1;
                            console::failure(format!(
                                "  SSH connectivity failed for '{name}': {e}"
                            ));
                        }
                    }
                    executor.close().await;
                }
                Err(e) => {
                    problems += 1;
                    console::failure(format!("  SSH connectivity failed for '{name}': {e}"));
                }
            }
        }
        console::blank();
    }

    if problems > 0 {
        return Err(SyncOpsError::ValidationFailed(problems));
    }
    console::success("Configuration validation completed successfully. All checks passed.");
    Ok(())
}
