//! Remote health checks.
//!
//! Every check is a single lightweight command. A failing check is recorded
//! as a warning in the report; it never aborts the run.

use std::fmt::Write as _;

use serde::Serialize;

use crate::config::DatabaseSettings;
use crate::db::MysqlCommandBuilder;
use crate::error::{Result, SyncOpsError};
use crate::remote::{argv, RemoteCommands};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Warning,
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct Check {
    pub label: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub detail: String,
}

impl Check {
    fn ok(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            status: Status::Ok,
            version: None,
            detail: detail.into(),
        }
    }

    fn warning(label: &str, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Warning,
            ..Self::ok(label, detail)
        }
    }

    fn skipped(label: &str, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Skipped,
            ..Self::ok(label, detail)
        }
    }

    fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Section {
    pub name: String,
    pub checks: Vec<Check>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub server: String,
    pub full: bool,
    pub sections: Vec<Section>,
}

impl HealthReport {
    pub fn warnings(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| &s.checks)
            .filter(|c| c.status == Status::Warning)
            .count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable rendering, one line per check.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "{} checks:", section.name);
            for check in &section.checks {
                let marker = match check.status {
                    Status::Ok => " ",
                    Status::Warning => "⚠",
                    Status::Skipped => "-",
                };
                let mut lines = check.detail.lines();
                let first = lines.next().unwrap_or("");
                let _ = writeln!(out, " {} {}: {}", marker, check.label, first);
                for line in lines {
                    let _ = writeln!(out, "      {}", line);
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Run all checks against `remote`.
pub async fn check(
    remote: &dyn RemoteCommands,
    server: &str,
    database: Option<&DatabaseSettings>,
    full: bool,
) -> HealthReport {
    let sections = vec![
        Section {
            name: "System".to_string(),
            checks: system(remote).await,
        },
        Section {
            name: "PHP".to_string(),
            checks: php(remote, full).await,
        },
        Section {
            name: "Database".to_string(),
            checks: database_checks(remote, database, full).await,
        },
        Section {
            name: "Project".to_string(),
            checks: project(remote).await,
        },
    ];
    HealthReport {
        server: server.to_string(),
        full,
        sections,
    }
}

async fn check_output(remote: &dyn RemoteCommands, command: &[&str]) -> Result<String> {
    remote.run_and_get(&argv(command.iter().copied())).await
}

async fn system(remote: &dyn RemoteCommands) -> Vec<Check> {
    let uptime = match check_output(remote, &["uptime"]).await {
        Ok(out) => Check::ok("Uptime", out),
        Err(e) => Check::warning("Uptime", format!("unable to retrieve uptime: {e}")),
    };
    let disk = match check_output(remote, &["df", "-h"]).await {
        Ok(out) => Check::ok("Disk usage", out),
        Err(e) => Check::warning("Disk usage", format!("unable to retrieve disk usage: {e}")),
    };
    vec![uptime, disk]
}

async fn php(remote: &dyn RemoteCommands, full: bool) -> Vec<Check> {
    let version = match check_output(remote, &["php", "-v"]).await {
        Ok(out) => out,
        Err(e) => {
            return vec![Check::warning(
                "Version",
                format!("unable to retrieve PHP version: {e}"),
            )]
        }
    };
    let mut checks =
        vec![Check::ok("Version", first_line(&version)).with_version(parse_version(&version))];

    if full {
        checks.push(match check_output(remote, &["php", "-m"]).await {
            Ok(out) => Check::ok("Modules", loaded_modules(&out)),
            Err(e) => Check::warning("Modules", format!("unable to retrieve PHP modules: {e}")),
        });
    }
    checks
}

async fn database_checks(
    remote: &dyn RemoteCommands,
    database: Option<&DatabaseSettings>,
    full: bool,
) -> Vec<Check> {
    let Some(db) = database.filter(|db| !db.database.trim().is_empty()) else {
        return vec![Check::skipped(
            "Client",
            "no database configured for this connection",
        )];
    };

    let (client, output) = match detect_database_client(remote).await {
        Ok(found) => found,
        Err(e) => {
            return vec![Check::warning(
                "Client",
                format!("unable to retrieve MySQL/MariaDB version: {e}"),
            )]
        }
    };
    let label = if client == "mariadb" { "MariaDB client" } else { "MySQL client" };
    let mut checks =
        vec![Check::ok(label, first_line(&output)).with_version(parse_version(&output))];

    if full {
        let connectivity = if db.username.trim().is_empty() {
            Check::skipped("Connectivity", "no username configured")
        } else {
            match remote
                .run_raw(&MysqlCommandBuilder::new(db).select_one(client))
                .await
            {
                Ok(_) => Check::ok("Connectivity", "SELECT 1 succeeded"),
                Err(e) => Check::warning("Connectivity", format!("SELECT 1 failed: {e}")),
            }
        };
        checks.push(connectivity);
    }
    checks
}

/// Prefer `mariadb`; `mysql` may be a deprecated alias on MariaDB hosts.
async fn detect_database_client(remote: &dyn RemoteCommands) -> Result<(&'static str, String)> {
    if let Ok(out) = check_output(remote, &["mariadb", "--version"]).await {
        if !out.trim().is_empty() {
            return Ok(("mariadb", out));
        }
    }
    let out = check_output(remote, &["mysql", "--version"]).await?;
    Ok(("mysql", out))
}

async fn project(remote: &dyn RemoteCommands) -> Vec<Check> {
    let mut checks = Vec::with_capacity(4);

    checks.push(match check_output(remote, &["pwd"]).await {
        Ok(out) => Check::ok("Working directory", out),
        Err(e) => Check::warning(
            "Working directory",
            format!("unable to confirm project path: {e}"),
        ),
    });

    let git = async {
        let clean = remote.is_remote_clean().await?;
        let branch = check_output(remote, &["git", "rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok::<_, SyncOpsError>((clean, branch))
    };
    checks.push(match git.await {
        Ok((true, branch)) => {
            Check::ok("Git", format!("working tree is clean on branch '{branch}'"))
        }
        Ok((false, branch)) => Check::warning(
            "Git",
            format!("working tree is NOT clean on branch '{branch}'"),
        ),
        Err(e) => Check::warning("Git", format!("unable to retrieve Git status: {e}")),
    });

    checks.push(match check_output(remote, &["php", "artisan", "--version"]).await {
        Ok(out) => Check::ok("Framework", out),
        Err(e) => Check::warning(
            "Framework",
            format!("unable to run 'php artisan --version': {e}"),
        ),
    });

    checks.push(match check_output(remote, &["php", "artisan", "winter:version"]).await {
        Ok(out) => Check::ok("Winter CMS", winter_build_line(&out)),
        Err(e) => Check::warning(
            "Winter CMS",
            format!("unable to run 'php artisan winter:version': {e}"),
        ),
    });

    checks
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// First version-like word (`8.0.35`, `10.11.6-MariaDB`), if any.
fn parse_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .map(|word| word.trim_end_matches([',', ';']))
        .find(|word| word.starts_with(|c: char| c.is_ascii_digit()) && word.contains('.'))
        .map(str::to_string)
}

fn loaded_modules(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('['))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The "Detected Winter CMS build" line, else the last line, without the
/// leading asterisks.
fn winter_build_line(output: &str) -> String {
    let lines: Vec<&str> = output.trim().lines().collect();
    let line = lines
        .iter()
        .find(|l| l.to_ascii_lowercase().contains("detected winter cms build"))
        .or_else(|| lines.last())
        .copied()
        .unwrap_or("");
    line.trim_start_matches(['*', ' ', '\t']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRemote;

    fn database() -> DatabaseSettings {
        DatabaseSettings {
            database: "shop".into(),
            username: "app".into(),
            password: "secret".into(),
            tables: Vec::new(),
        }
    }

    fn find<'a>(report: &'a HealthReport, section: &str, label: &str) -> &'a Check {
        report
            .sections
            .iter()
            .find(|s| s.name == section)
            .and_then(|s| s.checks.iter().find(|c| c.label == label))
            .unwrap()
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("mysql  Ver 8.0.35 Distrib 8.0.35, for Linux on x86_64").as_deref(),
            Some("8.0.35")
        );
        assert_eq!(
            parse_version("PHP 8.2.12 (cli) (built: Oct 24 2023)").as_deref(),
            Some("8.2.12")
        );
        assert_eq!(
            parse_version("mariadb from 11.2.2-MariaDB, client 15.2").as_deref(),
            Some("11.2.2-MariaDB")
        );
        assert_eq!(parse_version("no version here"), None);
    }

    #[test]
    fn test_winter_build_line() {
        assert_eq!(
            winter_build_line("*** Updating build...\n*** Detected Winter CMS build 1.2.4.\n"),
            "Detected Winter CMS build 1.2.4."
        );
        assert_eq!(winter_build_line("something\n** v1.2"), "v1.2");
        assert_eq!(winter_build_line(""), "");
    }

    #[test]
    fn test_loaded_modules() {
        assert_eq!(
            loaded_modules("[PHP Modules]\nctype\ncurl\n\n[Zend Modules]\nZend OPcache\n"),
            "ctype, curl, Zend OPcache"
        );
    }

    #[tokio::test]
    async fn test_basic_report() {
        let remote = ScriptedRemote::new()
            .on("uptime", " 10:00:00 up 3 days")
            .on("php -v", "PHP 8.2.12 (cli)\nCopyright (c) The PHP Group")
            .fail("mariadb --version", "", "mariadb: command not found", 127)
            .on("mysql --version", "mysql  Ver 8.0.35 Distrib 8.0.35")
            .on("pwd", "/var/www/site")
            .on("git rev-parse --abbrev-ref HEAD", "main");
        let db = database();
        let report = check(&remote, "production", Some(&db), false).await;

        assert_eq!(find(&report, "System", "Uptime").status, Status::Ok);
        let php = find(&report, "PHP", "Version");
        assert_eq!(php.detail, "PHP 8.2.12 (cli)");
        assert_eq!(php.version.as_deref(), Some("8.2.12"));
        assert_eq!(find(&report, "Database", "MySQL client").version.as_deref(), Some("8.0.35"));
        assert_eq!(
            find(&report, "Project", "Git").detail,
            "working tree is clean on branch 'main'"
        );
        assert!(!remote.issued_any("php -m"));
        assert!(!remote.issued().iter().any(|c| c.contains("SELECT 1")));
    }

    #[tokio::test]
    async fn test_full_report_checks_modules_and_connectivity() {
        let remote = ScriptedRemote::new()
            .on("php -v", "PHP 8.3.0 (cli)")
            .on("php -m", "[PHP Modules]\npdo_mysql")
            .on("mariadb --version", "mariadb from 11.2.2-MariaDB");
        let db = database();
        let report = check(&remote, "production", Some(&db), true).await;

        assert_eq!(find(&report, "PHP", "Modules").detail, "pdo_mysql");
        assert_eq!(find(&report, "Database", "MariaDB client").status, Status::Ok);
        assert_eq!(find(&report, "Database", "Connectivity").status, Status::Ok);
        assert_eq!(
            remote.count("MYSQL_PWD=secret mariadb -u app -e 'SELECT 1' shop"),
            1
        );
        assert!(!remote.issued_any("mysql --version"));
    }

    #[tokio::test]
    async fn test_failed_connectivity_check_masks_password() {
        let remote = ScriptedRemote::new()
            .on("mariadb --version", "mariadb from 11.2.2-MariaDB")
            .fail(
                "MYSQL_PWD=secret mariadb -u app -e 'SELECT 1' shop",
                "",
                "ERROR 1045 (28000): Access denied",
                1,
            );
        let report = check(&remote, "production", Some(&database()), true).await;

        let connectivity = find(&report, "Database", "Connectivity");
        assert_eq!(connectivity.status, Status::Warning);
        assert!(connectivity.detail.contains("Access denied"));
        assert!(connectivity.detail.contains("MYSQL_PWD=***"));
        assert!(!report.to_json().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn test_failures_are_warnings_not_errors() {
        let remote = ScriptedRemote::dirty()
            .fail("php -v", "", "php: command not found", 127)
            .fail("php artisan --version", "", "Could not open input file: artisan", 1)
            .on("git rev-parse --abbrev-ref HEAD", "prod");
        let report = check(&remote, "production", None, true).await;

        assert_eq!(find(&report, "PHP", "Version").status, Status::Warning);
        assert!(!remote.issued_any("php -m"));
        assert_eq!(find(&report, "Database", "Client").status, Status::Skipped);
        assert_eq!(find(&report, "Project", "Git").status, Status::Warning);
        assert_eq!(find(&report, "Project", "Framework").status, Status::Warning);
        assert_eq!(report.warnings(), 3);
    }

    #[tokio::test]
    async fn test_json_and_text_rendering() {
        let remote = ScriptedRemote::new()
            .on("uptime", "up 1 day")
            .on("df -h", "Filesystem\n/dev/sda1");
        let report = check(&remote, "production", None, false).await;

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["server"], "production");
        assert_eq!(json["sections"][0]["name"], "System");
        assert_eq!(json["sections"][0]["checks"][0]["status"], "ok");
        assert_eq!(json["sections"][2]["checks"][0]["status"], "skipped");

        let text = report.render();
        assert!(text.contains("System checks:"));
        assert!(text.contains("Uptime: up 1 day"));
        assert!(text.contains("      /dev/sda1"));
    }
}
