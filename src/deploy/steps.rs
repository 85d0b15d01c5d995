use serde::Deserialize;

use crate::remote::{argv, Argv};

/// Command vectors issued during a deployment. Defaults target Winter CMS;
/// every entry can be replaced under `[deploy.commands]`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeployCommands {
    pub maintenance_on: Argv,
    pub maintenance_off: Argv,
    pub cache_clear: Vec<Argv>,
    pub dependency_install: Vec<Argv>,
    pub migrate: Vec<Argv>,
}

impl Default for DeployCommands {
    fn default() -> Self {
        Self {
            maintenance_on: argv(["php", "artisan", "down"]),
            maintenance_off: argv(["php", "artisan", "up"]),
            cache_clear: vec![
                argv(["php", "artisan", "route:clear"]),
                argv(["php", "artisan", "config:clear"]),
                argv(["php", "artisan", "cache:clear"]),
            ],
            dependency_install: vec![argv(["composer", "install", "--no-dev"])],
            migrate: vec![argv(["php", "artisan", "winter:up"])],
        }
    }
}

impl DeployCommands {
    pub fn maintenance_on(&self, sudo: bool) -> Vec<Argv> {
        vec![wrap_sudo(&self.maintenance_on, sudo)]
    }

    pub fn maintenance_off(&self, sudo: bool) -> Vec<Argv> {
        vec![wrap_sudo(&self.maintenance_off, sudo)]
    }

    pub fn cache_clear(&self, sudo: bool) -> Vec<Argv> {
        wrap_all(&self.cache_clear, sudo)
    }

    pub fn dependency_install(&self, sudo: bool) -> Vec<Argv> {
        wrap_all(&self.dependency_install, sudo)
    }

    pub fn migrate(&self, sudo: bool) -> Vec<Argv> {
        wrap_all(&self.migrate, sudo)
    }
}

/// Prepend `sudo` to a command when requested.
pub fn wrap_sudo(command: &[String], sudo: bool) -> Argv {
    let mut wrapped = Vec::with_capacity(command.len() + 1);
    if sudo {
        wrapped.push("sudo".to_string());
    }
    wrapped.extend_from_slice(command);
    wrapped
}

fn wrap_all(commands: &[Argv], sudo: bool) -> Vec<Argv> {
    commands.iter().map(|c| wrap_sudo(c, sudo)).collect()
}

pub fn chown(user: &str, path: &str, sudo: bool) -> Argv {
    wrap_sudo(&argv(["chown", user, "-R", path]), sudo)
}

pub fn git_pull() -> Argv {
    argv(["git", "pull"])
}

pub fn git_fetch_and_merge(branch: &str) -> Vec<Argv> {
    vec![
        argv(["git", "fetch"]),
        argv(["git", "merge", &format!("origin/{branch}")]),
    ]
}

pub fn git_push(branch: &str) -> Argv {
    argv(["git", "push", "origin", branch])
}

pub fn git_reset_hard() -> Argv {
    argv(["git", "reset", "--hard"])
}
