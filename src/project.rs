//! Reconcile uncommitted work between the remote checkout and the local
//! repository through git.

use crate::console;
use crate::error::Result;
use crate::local::LocalCommands;
use crate::remote::{argv, RemoteCommands};

pub const DEFAULT_COMMIT_MESSAGE: &str = "Server changes";

#[derive(Clone, Debug, Default)]
pub struct PullOptions {
    pub no_merge: bool,
    /// Run `git pull` on the remote before pushing.
    pub pull: bool,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    NoChanges,
    Pushed { branch: String, merged: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    NoChanges,
    Pushed,
}

fn commit_message(message: Option<&str>) -> &str {
    message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_COMMIT_MESSAGE)
}

/// Commit remote changes, push them to origin and merge them locally.
pub async fn pull(
    remote: &dyn RemoteCommands,
    local: &dyn LocalCommands,
    options: &PullOptions,
) -> Result<PullOutcome> {
    if remote.is_remote_clean().await? {
        return Ok(PullOutcome::NoChanges);
    }

    let message = commit_message(options.message.as_deref());
    console::line(format!("Committing the changes with message: '{message}'"));
    remote
        .run_and_print(&[
            argv(["git", "add", "--all"]),
            argv(["git", "commit", "-m", message]),
        ])
        .await?;

    if options.pull {
        console::line("Pulling new changes on the remote:");
        remote.run_and_print(&[argv(["git", "pull"])]).await?;
    }

    let branch = remote
        .run_and_get(&argv(["git", "rev-parse", "--abbrev-ref", "HEAD"]))
        .await?;

    console::line(format!("Pushing the changes to origin ({branch}):"));
    remote
        .run_and_print(&[argv(["git", "push", "origin", branch.as_str()])])
        .await?;

    if options.no_merge {
        return Ok(PullOutcome::Pushed {
            branch,
            merged: false,
        });
    }

    console::line("Merging the changes locally:");
    console::echo(&local.run_args(&argv(["git", "fetch"])).await?);
    console::echo(
        &local
            .run_args(&argv(["git", "merge", &format!("origin/{branch}")]))
            .await?,
    );

    Ok(PullOutcome::Pushed {
        branch,
        merged: true,
    })
}

/// Commit local changes and push them.
pub async fn push(local: &dyn LocalCommands, message: Option<&str>) -> Result<PushOutcome> {
    console::line("Checking for local changes...");
    let status = local
        .run_args(&argv(["git", "status", "--porcelain"]))
        .await?;
    if status.trim().is_empty() {
        return Ok(PushOutcome::NoChanges);
    }

    let message = commit_message(message);
    console::line("Adding all changes...");
    local.run_args(&argv(["git", "add", "--all"])).await?;
    console::line(format!("Committing with message: '{message}'"));
    local
        .run_args(&argv(["git", "commit", "-m", message]))
        .await?;
    console::line("Pushing changes to the remote repository...");
    local.run_args(&argv(["git", "push"])).await?;

    Ok(PushOutcome::Pushed)
}
