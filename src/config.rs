//! Configuration for syncops.
//!
//! Connections, deploy overrides and local settings are read from a TOML
//! file (`syncops.toml` by default). `${VAR}` and `${VAR:-default}`
//! placeholders inside string values are expanded from the environment
//! after parsing, so passwords and hosts can stay out of the file and are
//! taken verbatim whatever characters they contain.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::deploy::{DeployCommands, MigrationPolicy};
use crate::error::{Result, SyncOpsError};

pub const DEFAULT_CONFIG_FILE: &str = "syncops.toml";
pub const CONFIG_ENV: &str = "SYNCOPS_CONFIG";

/// Top-level configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connections: BTreeMap<String, ConnectionConfig>,
    pub deploy: DeploySettings,
    pub local: LocalSettings,
}

/// One named remote server.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub ssh: SshSettings,
    pub project: ProjectSettings,
    pub permissions: Permissions,
    pub database: Option<DatabaseSettings>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub host: String,
    #[serde(deserialize_with = "port_number")]
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: None,
            key_path: None,
            key_passphrase: None,
        }
    }
}

/// Accepts `port = 2222` as well as `port = "${SSH_PORT}"`.
fn port_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(raw) => raw
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid port '{raw}'"))),
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub path: String,
    pub branch_main: BranchMain,
    pub branch_prod: Option<String>,
}

/// Where deployments take their changes from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "BranchMainValue")]
pub enum BranchMain {
    /// `branch_main = false`: plain `git pull`, no fetch/merge/push.
    PullOnly,
    /// Merge `origin/<branch>` into the checked out branch.
    Merge(String),
}

impl Default for BranchMain {
    fn default() -> Self {
        BranchMain::Merge("main".to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BranchMainValue {
    Flag(bool),
    Name(String),
}

impl From<BranchMainValue> for BranchMain {
    fn from(value: BranchMainValue) -> Self {
        match value {
            BranchMainValue::Flag(false) => BranchMain::PullOnly,
            BranchMainValue::Flag(true) => BranchMain::default(),
            // `${VAR}` expansion can only produce strings
            BranchMainValue::Name(name)
                if name.eq_ignore_ascii_case("false") || name.eq_ignore_ascii_case("(false)") =>
            {
                BranchMain::PullOnly
            }
            BranchMainValue::Name(name) => BranchMain::Merge(name),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub root_user: Option<String>,
    pub web_user: Option<String>,
    pub web_folders: WebFolders,
}

impl Permissions {
    pub fn root_user(&self) -> Option<&str> {
        non_empty(self.root_user.as_deref())
    }

    /// The web user and its folders, when both are configured.
    pub fn web_ownership(&self) -> Option<(&str, &WebFolders)> {
        let user = non_empty(self.web_user.as_deref())?;
        if self.web_folders.is_empty() {
            return None;
        }
        Some((user, &self.web_folders))
    }
}

/// Folders handed to the web user. Accepts either a TOML array or a
/// comma-separated string; both normalize to the same trimmed list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "WebFoldersValue")]
pub struct WebFolders(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum WebFoldersValue {
    List(Vec<String>),
    Csv(String),
}

impl From<WebFoldersValue> for WebFolders {
    fn from(value: WebFoldersValue) -> Self {
        match value {
            WebFoldersValue::List(items) => WebFolders::new(items),
            WebFoldersValue::Csv(raw) => WebFolders::new(raw.split(',')),
        }
    }
}

impl WebFolders {
    pub fn new<I, S>(folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            folders
                .into_iter()
                .map(|f| f.as_ref().trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub database: String,
    pub username: String,
    pub password: String,
    pub tables: Vec<String>,
}

impl DatabaseSettings {
    pub fn is_blank(&self) -> bool {
        self.database.is_empty()
            && self.username.is_empty()
            && self.password.is_empty()
            && self.tables.is_empty()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub migration_policy: MigrationPolicy,
    /// Pause after entering maintenance mode so in-flight requests finish.
    pub drain_delay_ms: u64,
    pub commands: DeployCommands,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            migration_policy: MigrationPolicy::default(),
            drain_delay_ms: 1000,
            commands: DeployCommands::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    pub project_root: PathBuf,
    pub timeout_secs: u64,
    pub database: Option<DatabaseSettings>,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            timeout_secs: 60,
            database: None,
        }
    }
}

impl ConnectionConfig {
    /// Remote working directory without a trailing slash, if configured.
    pub fn project_path(&self) -> Option<&str> {
        let path = self.project.path.trim();
        if path.is_empty() {
            return None;
        }
        match path.trim_end_matches('/') {
            "" => Some("/"),
            trimmed => Some(trimmed),
        }
    }

    pub fn branch_prod(&self) -> Option<&str> {
        non_empty(self.project.branch_prod.as_deref())
    }
}

impl Settings {
    /// Load settings from `explicit`, `$SYNCOPS_CONFIG` or `./syncops.toml`.
    pub fn load(explicit: Option<&Path>) -> Result<(Settings, PathBuf)> {
        let path = resolve_config_path(explicit, std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let raw = std::fs::read_to_string(&path).map_err(|source| SyncOpsError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let settings = Self::parse(&raw, &path)?;
        log::debug!(
            "loaded {} connection(s) from {}",
            settings.connections.len(),
            path.display()
        );
        Ok((settings, path))
    }

    /// Like [`Settings::load`], but a missing default file yields the
    /// default settings. Used by commands that only touch the local project.
    pub fn load_optional(explicit: Option<&Path>) -> Result<Settings> {
        let path = resolve_config_path(explicit, std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        if explicit.is_none() && !path.exists() {
            log::debug!("{} not found, using defaults", path.display());
            return Ok(Settings::default());
        }
        Self::load(Some(&path)).map(|(settings, _)| settings)
    }

    pub fn parse(raw: &str, origin: &Path) -> Result<Settings> {
        Self::parse_with(raw, origin, &|name| std::env::var(name).ok())
    }

    fn parse_with(
        raw: &str,
        origin: &Path,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Settings> {
        let parse_error = |source| SyncOpsError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        };
        let mut document = toml::Value::Table(raw.parse().map_err(parse_error)?);
        expand_strings(&mut document, lookup);
        document.try_into().map_err(parse_error)
    }

    pub fn connection(&self, server: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(server)
            .ok_or_else(|| SyncOpsError::UnknownServer(server.to_string()))
    }
}

fn resolve_config_path(explicit: Option<&Path>, from_env: Option<PathBuf>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or(from_env)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Replace `${NAME}` / `${NAME:-fallback}` placeholders. Unknown names
/// without a fallback expand to an empty string.
pub fn expand_vars<F>(raw: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };
        match lookup(name.trim()).filter(|v| !v.is_empty()) {
            Some(value) => out.push_str(&value),
            None => out.push_str(fallback.unwrap_or("")),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Expand placeholders in every string value of a parsed document.
fn expand_strings(value: &mut toml::Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(s) if s.contains("${") => *s = expand_vars(s, lookup),
        toml::Value::Array(items) => items.iter_mut().for_each(|v| expand_strings(v, lookup)),
        toml::Value::Table(table) => table
            .iter_mut()
            .map(|(_, v)| v)
            .for_each(|v| expand_strings(v, lookup)),
        _ => {}
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
