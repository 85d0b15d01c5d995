use std::borrow::Cow;

use super::{Argv, RemoteShell};
use crate::console;
use crate::error::{Result, SyncOpsError};

/// Environment assignments whose values are masked in logs and errors.
const SECRET_ENV: [&str; 1] = ["MYSQL_PWD="];

/// Build an argument vector from anything string-like.
pub fn argv<I, S>(parts: I) -> Argv
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

/// POSIX-quote a single argument.
pub fn quote(arg: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(arg))
}

/// Render an argument vector as a shell string where every argument stays
/// a single literal word.
pub fn render_command(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mask the values of secret environment assignments (`MYSQL_PWD=...`)
/// in a shell string.
pub fn redact(command: &str) -> Cow<'_, str> {
    if !SECRET_ENV.iter().any(|key| command.contains(key)) {
        return Cow::Borrowed(command);
    }
    let mut out = String::with_capacity(command.len());
    let mut rest = command;
    while let Some((start, key)) = SECRET_ENV
        .iter()
        .filter_map(|key| rest.find(key).map(|i| (i, *key)))
        .min()
    {
        let value = start + key.len();
        out.push_str(&rest[..value]);
        out.push_str("***");
        rest = &rest[value + shell_word_len(&rest[value..])..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Byte length of the shell word at the start of `s`.
fn shell_word_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '\'' | '"' => {
                for (_, q) in chars.by_ref() {
                    if q == c {
                        break;
                    }
                }
            }
            c if c.is_whitespace() || matches!(c, ';' | '&' | '|' | '<' | '>') => return i,
            _ => {}
        }
    }
    s.len()
}

/// Quote a working directory, keeping a leading `~` expandable.
fn render_base_dir(dir: &str) -> String {
    if dir == "~" {
        return "\"$HOME\"".to_string();
    }
    match dir.strip_prefix("~/") {
        Some(rest) if !rest.is_empty() => format!("\"$HOME\"/{}", quote(rest)),
        Some(_) => "\"$HOME\"".to_string(),
        None => quote(dir).into_owned(),
    }
}

/// `cd <dir> && <command>`
pub fn compose(base_dir: &str, command: &str) -> String {
    format!("cd {} && {}", render_base_dir(base_dir), command)
}

/// Runs argument vectors inside a base directory on a [`RemoteShell`].
pub struct SecureCommandExecutor<'a, S: RemoteShell + ?Sized> {
    server: &'a str,
    base_dir: Option<&'a str>,
    shell: &'a S,
}

impl<'a, S: RemoteShell + ?Sized> SecureCommandExecutor<'a, S> {
    pub fn new(server: &'a str, base_dir: Option<&'a str>, shell: &'a S) -> Self {
        Self {
            server,
            base_dir: base_dir.filter(|d| !d.trim().is_empty()),
            shell,
        }
    }

    fn base_dir(&self) -> Result<&'a str> {
        self.base_dir
            .ok_or_else(|| SyncOpsError::PathNotConfigured(self.server.to_string()))
    }

    /// Run each command in order; outputs are trimmed and joined with `\n`.
    /// Stops at the first failing command.
    pub async fn run(&self, commands: &[Argv]) -> Result<String> {
        let base_dir = self.base_dir()?;
        let mut output = Vec::with_capacity(commands.len());

        for command in commands {
            if command.is_empty() {
                log::warn!("skipping empty command for [{}]", self.server);
                continue;
            }
            let rendered = render_command(command);
            let stdout = self.execute(base_dir, rendered).await?;
            output.push(stdout.trim().to_string());
        }

        Ok(output.join("\n"))
    }

    /// Run a single command and return its trimmed output.
    pub async fn run_and_get(&self, command: &[String]) -> Result<String> {
        let output = self.run(&[command.to_vec()]).await?;
        Ok(output.trim().to_string())
    }

    /// Like [`run`](Self::run), echoing each command's output as soon as it
    /// finishes.
    pub async fn run_and_print(&self, commands: &[Argv]) -> Result<String> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            let output = self.run(std::slice::from_ref(command)).await?;
            console::echo(&output);
            outputs.push(output);
        }
        Ok(outputs.join("\n").trim().to_string())
    }

    /// Run a trusted raw command string. Only the base directory is quoted.
    pub async fn run_raw(&self, command: &str) -> Result<String> {
        let base_dir = self.base_dir()?;
        self.execute(base_dir, command.to_string()).await
    }

    async fn execute(&self, base_dir: &str, command: String) -> Result<String> {
        let full = compose(base_dir, &command);
        log::debug!("[{}] {}", self.server, redact(&full));
        let result = self.shell.exec(&full).await?;

        if !result.success() {
            return Err(SyncOpsError::RemoteCommandFailed {
                server: self.server.to_string(),
                command: redact(&command).into_owned(),
                stdout: result.stdout,
                stderr: result.stderr.trim().to_string(),
                exit_code: result.exit_code,
            });
        }

        Ok(result.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CommandResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records composed commands and replays canned results.
    #[derive(Default)]
    struct RecordingShell {
        issued: Mutex<Vec<String>>,
        results: Mutex<VecDeque<CommandResult>>,
    }

    impl RecordingShell {
        fn with(results: Vec<CommandResult>) -> Self {
            Self {
                issued: Mutex::default(),
                results: Mutex::new(results.into()),
            }
        }

        fn issued(&self) -> Vec<String> {
            self.issued.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for RecordingShell {
        async fn exec(&self, command: &str) -> Result<CommandResult> {
            self.issued.lock().unwrap().push(command.to_string());
            Ok(self.results.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    /// Runs composed commands with the local `sh`.
    struct PosixShell;

    #[async_trait]
    impl RemoteShell for PosixShell {
        async fn exec(&self, command: &str) -> Result<CommandResult> {
            let output = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .output()
                .await?;
            Ok(CommandResult {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    fn ok(stdout: &str) -> CommandResult {
        CommandResult {
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_quotes_metacharacters() {
        assert_eq!(
            render_command(&argv(["echo", "a; rm -rf /"])),
            "echo 'a; rm -rf /'"
        );
        assert_eq!(
            render_command(&argv(["git", "merge", "origin/main"])),
            "git merge origin/main"
        );
        assert_eq!(render_command(&argv(["printf", ""])), "printf ''");
        assert_eq!(
            render_command(&argv(["git", "commit", "-m", "it's $HOME"])),
            r"git commit -m 'it'\''s $HOME'"
        );
    }

    #[test]
    fn test_compose_base_dir() {
        assert_eq!(compose("/var/www/site", "ls"), "cd /var/www/site && ls");
        assert_eq!(compose("/srv/my site", "ls"), "cd '/srv/my site' && ls");
        assert_eq!(compose("~/site", "ls"), "cd \"$HOME\"/site && ls");
        assert_eq!(compose("~", "ls"), "cd \"$HOME\" && ls");
    }

    #[tokio::test]
    async fn test_run_joins_trimmed_outputs() {
        let shell = RecordingShell::with(vec![ok("  one\n"), ok("two\n\n")]);
        let exec = SecureCommandExecutor::new("production", Some("/srv/app"), &shell);
        let out = exec
            .run(&[argv(["git", "fetch"]), argv(["git", "merge", "origin/main"])])
            .await
            .unwrap();
        assert_eq!(out, "one\ntwo");
        assert_eq!(
            shell.issued(),
            [
                "cd /srv/app && git fetch",
                "cd /srv/app && git merge origin/main"
            ]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_and_stops() {
        let failed = CommandResult {
            stdout: "partial".into(),
            exit_code: 128,
            stderr: "fatal: not a git repository\n".into(),
        };
        let shell = RecordingShell::with(vec![failed, ok("never")]);
        let exec = SecureCommandExecutor::new("production", Some("/srv/app"), &shell);
        let err = exec
            .run(&[argv(["git", "pull"]), argv(["git", "status"])])
            .await
            .unwrap_err();

        match err {
            SyncOpsError::RemoteCommandFailed {
                server,
                command,
                stdout,
                stderr,
                exit_code,
            } => {
                assert_eq!(server, "production");
                assert_eq!(command, "git pull");
                assert_eq!(stdout, "partial");
                assert_eq!(stderr, "fatal: not a git repository");
                assert_eq!(exit_code, 128);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(shell.issued().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_base_dir_is_usage_error() {
        let shell = RecordingShell::default();
        for base in [None, Some(""), Some("   ")] {
            let exec = SecureCommandExecutor::new("staging", base, &shell);
            assert!(matches!(
                exec.run(&[argv(["ls"])]).await,
                Err(SyncOpsError::PathNotConfigured(ref s)) if s == "staging"
            ));
            assert!(matches!(
                exec.run_raw("ls | wc -l").await,
                Err(SyncOpsError::PathNotConfigured(_))
            ));
        }
        assert!(shell.issued().is_empty());
    }

    #[tokio::test]
    async fn test_raw_command_is_not_requoted() {
        let shell = RecordingShell::with(vec![ok("3\n")]);
        let exec = SecureCommandExecutor::new("s", Some("/srv/app"), &shell);
        let out = exec.run_raw("ls | wc -l").await.unwrap();
        assert_eq!(out, "3\n");
        assert_eq!(shell.issued(), ["cd /srv/app && ls | wc -l"]);
    }

    #[tokio::test]
    async fn test_run_and_get_trims_single_output() {
        let shell = RecordingShell::with(vec![ok("\n  main \n")]);
        let exec = SecureCommandExecutor::new("production", Some("/srv/app"), &shell);
        let out = exec
            .run_and_get(&argv(["git", "rev-parse", "--abbrev-ref", "HEAD"]))
            .await
            .unwrap();
        assert_eq!(out, "main");
        assert_eq!(shell.issued(), ["cd /srv/app && git rev-parse --abbrev-ref HEAD"]);
    }

    #[tokio::test]
    async fn test_run_and_print_joins_per_command_outputs() {
        let shell =
            RecordingShell::with(vec![ok("Already up to date.\n"), ok(""), ok(" done \n")]);
        let exec = SecureCommandExecutor::new("production", Some("/srv/app"), &shell);
        let out = exec
            .run_and_print(&[
                argv(["git", "pull"]),
                argv(["php", "artisan", "cache:clear"]),
                argv(["php", "artisan", "winter:up"]),
            ])
            .await
            .unwrap();
        assert_eq!(out, "Already up to date.\n\ndone");
        assert_eq!(shell.issued().len(), 3);
    }

    #[tokio::test]
    async fn test_run_and_print_stops_at_first_failure() {
        let failed = CommandResult {
            exit_code: 1,
            stderr: "error: cannot pull with rebase".into(),
            ..Default::default()
        };
        let shell = RecordingShell::with(vec![ok("fetched"), failed, ok("never")]);
        let exec = SecureCommandExecutor::new("production", Some("/srv/app"), &shell);
        let err = exec
            .run_and_print(&[
                argv(["git", "fetch"]),
                argv(["git", "pull"]),
                argv(["git", "push"]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncOpsError::RemoteCommandFailed { ref command, .. } if command == "git pull"
        ));
        assert_eq!(shell.issued().len(), 2);
    }

    #[test]
    fn test_redact_masks_quoted_and_bare_secrets() {
        assert_eq!(
            redact(r"MYSQL_PWD='p'\''ss word' mysqldump -u app shop > /tmp/x.sql"),
            "MYSQL_PWD=*** mysqldump -u app shop > /tmp/x.sql"
        );
        assert_eq!(
            redact("cd /srv && MYSQL_PWD=secret mysql -u app -e 'SELECT 1' shop"),
            "cd /srv && MYSQL_PWD=*** mysql -u app -e 'SELECT 1' shop"
        );
        assert_eq!(redact("MYSQL_PWD=s3cr3t;id"), "MYSQL_PWD=***;id");
        assert_eq!(redact("MYSQL_PWD="), "MYSQL_PWD=***");
        assert!(matches!(redact("git pull"), Cow::Borrowed("git pull")));
    }

    #[tokio::test]
    async fn test_failed_raw_command_does_not_expose_password() {
        let failed = CommandResult {
            exit_code: 2,
            stderr: "Access denied".into(),
            ..Default::default()
        };
        let shell = RecordingShell::with(vec![failed]);
        let exec = SecureCommandExecutor::new("production", Some("/srv/app"), &shell);
        let err = exec
            .run_raw(r#"MYSQL_PWD='hunter\2 "x' mysqldump -u app shop > /tmp/d.sql"#)
            .await
            .unwrap_err();

        let text = err.to_string();
        assert!(!text.contains("hunter"));
        assert!(text.contains("MYSQL_PWD=*** mysqldump -u app shop > /tmp/d.sql"));
        assert!(shell.issued()[0].contains("hunter"));
    }

    #[tokio::test]
    async fn test_metacharacters_stay_literal_in_a_real_shell() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pwned");
        let payload = format!("a; touch {}", marker.display());
        let base = dir.path().to_str().unwrap();

        let exec = SecureCommandExecutor::new("local", Some(base), &PosixShell);
        let out = exec.run(&[argv(["echo", payload.as_str()])]).await.unwrap();
        assert_eq!(out, payload);
        assert!(!marker.exists());

        let out = exec.run(&[argv(["echo", "a; rm -rf /"])]).await.unwrap();
        assert_eq!(out, "a; rm -rf /");
    }

    #[tokio::test]
    async fn test_real_shell_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        let exec = SecureCommandExecutor::new("local", Some(base), &PosixShell);
        let err = exec
            .run_raw("echo boom >&2; exit 3")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncOpsError::RemoteCommandFailed { exit_code: 3, ref stderr, .. } if stderr == "boom"
        ));
    }
}
