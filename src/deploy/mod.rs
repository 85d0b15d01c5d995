//! Git-based deployment to a remote server.
//!
//! A deployment walks a fixed sequence of states: preflight check, optional
//! maintenance window with cache flushes, the git update itself, conflict
//! revert or post-deploy hooks, and ownership fixup. Every visited state is
//! recorded so callers and tests can inspect the path that was taken.

pub mod detect;
pub mod steps;


use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{BranchMain, ConnectionConfig, DeploySettings};
use crate::console;
use crate::error::{Result, SyncOpsError};
use crate::remote::{Argv, RemoteCommands};

pub use detect::{looks_like_merge_conflict, touched_dependency_manifest};
pub use steps::{wrap_sudo, DeployCommands};

/// When migrations run after a successful update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPolicy {
    /// Only when `--migrate` is given.
    #[default]
    ExplicitOnly,
    /// With `--migrate`, or whenever dependencies were installed.
    FollowDependencyInstall,
}

impl MigrationPolicy {
    pub fn should_migrate(self, requested: bool, dependencies_installed: bool) -> bool {
        match self {
            MigrationPolicy::ExplicitOnly => requested,
            MigrationPolicy::FollowDependencyInstall => requested || dependencies_installed,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeployOptions {
    /// Skip the maintenance window and cache flushes.
    pub fast: bool,
    /// Force a dependency install.
    pub composer: bool,
    pub migrate: bool,
    pub sudo: bool,
    /// Push target overriding `branch_prod`.
    pub branch: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeployState {
    Idle,
    PreflightCheck,
    MaintenanceOn,
    CacheClear,
    UpdateStep,
    ConflictRevert,
    PostDeployHooks,
    OwnershipFixup,
    CacheRebuild,
    MaintenanceOff,
    Done,
    Failed,
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployState::Idle => "idle",
            DeployState::PreflightCheck => "preflight-check",
            DeployState::MaintenanceOn => "maintenance-on",
            DeployState::CacheClear => "cache-clear",
            DeployState::UpdateStep => "update",
            DeployState::ConflictRevert => "conflict-revert",
            DeployState::PostDeployHooks => "post-deploy-hooks",
            DeployState::OwnershipFixup => "ownership-fixup",
            DeployState::CacheRebuild => "cache-rebuild",
            DeployState::MaintenanceOff => "maintenance-off",
            DeployState::Done => "done",
            DeployState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub success: bool,
    pub conflicted: bool,
}

impl DeploymentOutcome {
    fn completed() -> Self {
        Self {
            success: true,
            conflicted: false,
        }
    }

    fn conflicted() -> Self {
        Self {
            success: false,
            conflicted: true,
        }
    }

    /// Map a conflicted deployment to [`SyncOpsError::MergeConflictDetected`].
    pub fn into_result(self, server: &str) -> Result<()> {
        if self.conflicted {
            return Err(SyncOpsError::MergeConflictDetected {
                server: server.to_string(),
            });
        }
        Ok(())
    }
}

/// One deployment run against one server.
pub struct Deployment<'a> {
    remote: &'a dyn RemoteCommands,
    server: &'a str,
    config: &'a ConnectionConfig,
    settings: &'a DeploySettings,
    options: DeployOptions,
    trace: Vec<DeployState>,
}

impl<'a> Deployment<'a> {
    pub fn new(
        remote: &'a dyn RemoteCommands,
        server: &'a str,
        config: &'a ConnectionConfig,
        settings: &'a DeploySettings,
        options: DeployOptions,
    ) -> Self {
        Self {
            remote,
            server,
            config,
            settings,
            options,
            trace: vec![DeployState::Idle],
        }
    }

    /// States visited so far, in order.
    pub fn trace(&self) -> &[DeployState] {
        &self.trace
    }

    pub async fn run(&mut self) -> Result<DeploymentOutcome> {
        let result = self.execute().await;
        let terminal = match &result {
            Ok(outcome) if outcome.success => DeployState::Done,
            _ => DeployState::Failed,
        };
        self.enter(terminal);
        result
    }

    async fn execute(&mut self) -> Result<DeploymentOutcome> {
        self.enter(DeployState::PreflightCheck);
        if !self.remote.is_remote_clean().await? {
            return Err(SyncOpsError::RemoteNotClean {
                server: self.server.to_string(),
            });
        }

        let outcome = if self.options.fast {
            self.update().await?
        } else {
            self.full().await?
        };

        self.enter(DeployState::OwnershipFixup);
        self.fix_web_ownership().await?;

        Ok(outcome)
    }

    async fn full(&mut self) -> Result<DeploymentOutcome> {
        let settings = self.settings;
        let commands = &settings.commands;
        let sudo = self.options.sudo;

        self.enter(DeployState::MaintenanceOn);
        console::line("Putting the application into maintenance mode:");
        self.issue(&commands.maintenance_on(sudo)).await?;

        match self.inside_maintenance().await {
            Ok(outcome) => {
                self.enter(DeployState::MaintenanceOff);
                console::line("Bringing the application out of maintenance mode:");
                self.issue(&commands.maintenance_off(sudo)).await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(up) = self.issue(&commands.maintenance_off(sudo)).await {
                    log::warn!("[{}] leaving maintenance mode failed: {}", self.server, up);
                    console::warn("The application may still be in maintenance mode.");
                }
                Err(e)
            }
        }
    }

    async fn inside_maintenance(&mut self) -> Result<DeploymentOutcome> {
        let settings = self.settings;
        let delay = Duration::from_millis(settings.drain_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.enter(DeployState::CacheClear);
        console::line("Flushing the application cache:");
        self.issue(&settings.commands.cache_clear(self.options.sudo))
            .await?;

        let outcome = self.update().await?;

        self.enter(DeployState::CacheRebuild);
        console::line("Rebuilding the application cache:");
        self.issue(&settings.commands.cache_clear(self.options.sudo))
            .await?;

        Ok(outcome)
    }

    /// Ownership pre-step, git update, then revert or hooks.
    async fn update(&mut self) -> Result<DeploymentOutcome> {
        if let Some(root_user) = self.config.permissions.root_user() {
            console::line("Handling file ownership...");
            self.issue(&[steps::chown(root_user, ".", self.options.sudo)])
                .await?;
        }

        self.enter(DeployState::UpdateStep);
        let output = match &self.config.project.branch_main {
            BranchMain::PullOnly => {
                console::line("Deploying the project (pull mode):");
                self.run_update(&[steps::git_pull()]).await?
            }
            BranchMain::Merge(branch) => {
                console::line("Deploying the project (merge mode):");
                self.run_update(&steps::git_fetch_and_merge(branch)).await?
            }
        };

        if looks_like_merge_conflict(&output) {
            self.enter(DeployState::ConflictRevert);
            console::failure("Conflicts detected. Reverting changes...");
            self.issue(&[steps::git_reset_hard()]).await?;
            return Ok(DeploymentOutcome::conflicted());
        }

        if let BranchMain::Merge(_) = self.config.project.branch_main {
            if let Some(target) = self.push_target() {
                self.issue(&[steps::git_push(&target)]).await?;
            }
        }

        self.enter(DeployState::PostDeployHooks);
        self.after_update(&output).await?;

        self.enter(DeployState::OwnershipFixup);
        self.fix_web_ownership().await?;

        Ok(DeploymentOutcome::completed())
    }

    /// Run the git update. A command that exits non-zero while reporting a
    /// conflict still yields its output so the conflict can be reverted.
    async fn run_update(&self, commands: &[Argv]) -> Result<String> {
        match self.remote.run_and_print(commands).await {
            Ok(output) => Ok(output),
            Err(e) => match e.remote_output() {
                Some(output) if looks_like_merge_conflict(&output) => {
                    console::echo(&output);
                    Ok(output)
                }
                _ => Err(e),
            },
        }
    }

    async fn after_update(&self, output: &str) -> Result<()> {
        let commands = &self.settings.commands;
        let sudo = self.options.sudo;

        let install = self.options.composer || touched_dependency_manifest(output);
        if install {
            console::line("Running Composer install (remote)...");
            self.issue(&commands.dependency_install(sudo)).await?;
        }

        if self
            .settings
            .migration_policy
            .should_migrate(self.options.migrate, install)
        {
            console::line("Running migrations (remote)...");
            self.issue(&commands.migrate(sudo)).await?;
        }

        Ok(())
    }

    async fn fix_web_ownership(&self) -> Result<()> {
        let Some((user, folders)) = self.config.permissions.web_ownership() else {
            return Ok(());
        };
        console::line("Handling file ownership...");
        for folder in folders.iter() {
            self.issue(&[steps::chown(user, folder, self.options.sudo)])
                .await?;
        }
        Ok(())
    }

    fn push_target(&self) -> Option<String> {
        self.options
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .or_else(|| self.config.branch_prod())
            .map(str::to_string)
    }

    async fn issue(&self, commands: &[Argv]) -> Result<String> {
        self.remote.run_and_print(commands).await
    }

    fn enter(&mut self, state: DeployState) {
        log::debug!("[{}] deploy state: {}", self.server, state);
        self.trace.push(state);
    }
}
