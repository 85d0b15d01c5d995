use std::path::Path;

use anyhow::Context;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;

/// SFTP operations wrapper.
pub struct SftpClient {
    session: Option<SftpSession>,
}

impl Default for SftpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SftpClient {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Initialize the SFTP session from a channel that already requested
    /// the `sftp` subsystem.
    pub async fn init(
        &mut self,
        channel: russh::Channel<russh::client::Msg>,
    ) -> Result<(), anyhow::Error> {
        let sftp = SftpSession::new(channel.into_stream()).await?;
        self.session = Some(sftp);
        Ok(())
    }

    fn session(&self) -> Result<&SftpSession, anyhow::Error> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SFTP session not initialized"))
    }

    /// Download a remote file, streaming it into `local_path`.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), anyhow::Error> {
        let sftp = self.session()?;

        let mut remote = sftp
            .open(remote_path)
            .await
            .with_context(|| format!("Failed to open remote file {}", remote_path))?;
        let mut local = tokio::fs::File::create(local_path)
            .await
            .with_context(|| format!("Failed to create local file {}", local_path.display()))?;
        let bytes = tokio::io::copy(&mut remote, &mut local).await?;
        local.flush().await?;

        log::info!(
            "Downloaded {} -> {} ({} bytes)",
            remote_path,
            local_path.display(),
            bytes
        );
        Ok(())
    }

    /// Upload a local file to `remote_path`, replacing it if present.
    pub async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), anyhow::Error> {
        let sftp = self.session()?;

        let mut local = tokio::fs::File::open(local_path)
            .await
            .with_context(|| {
                format!("Local file not found or unreadable: {}", local_path.display())
            })?;
        if !local.metadata().await?.is_file() {
            anyhow::bail!("Local path is not a regular file: {}", local_path.display());
        }

        let mut remote = sftp
            .create(remote_path)
            .await
            .with_context(|| format!("Failed to create remote file {}", remote_path))?;
        let bytes = tokio::io::copy(&mut local, &mut remote).await?;
        remote.shutdown().await?;

        log::info!(
            "Uploaded {} -> {} ({} bytes)",
            local_path.display(),
            remote_path,
            bytes
        );
        Ok(())
    }

    /// Recursively list regular files under `root`, dropping thumbnail
    /// folders and dotfiles (except `.gitignore`). Paths are returned as
    /// `<root>/<relative>` and are not sorted.
    pub async fn list_files_recursively(&self, root: &str) -> Result<Vec<String>, anyhow::Error> {
        let sftp = self.session()?;
        let root = match root.trim_end_matches('/') {
            "" if root.starts_with('/') => "/",
            trimmed => trimmed,
        };

        let mut files = Vec::new();
        let mut pending = vec![String::new()];

        while let Some(relative_dir) = pending.pop() {
            let dir = join_remote(root, &relative_dir);
            let entries = sftp
                .read_dir(&dir)
                .await
                .with_context(|| format!("Failed to list remote directory {}", dir))?;

            for entry in entries {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    continue;
                }
                let relative = if relative_dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", relative_dir, name)
                };

                let file_type = entry.file_type();
                if file_type.is_dir() {
                    if !in_skipped_folder(&format!("{}/", relative)) {
                        pending.push(relative);
                    }
                } else if file_type.is_file() && keep_listed_file(&relative) {
                    files.push(join_remote(root, &relative));
                }
            }
        }

        Ok(files)
    }

    /// Size of a remote file, or `None` when it cannot be stat'ed.
    pub async fn file_size(&self, remote_path: &str) -> Result<Option<u64>, anyhow::Error> {
        let sftp = self.session()?;
        match sftp.metadata(remote_path).await {
            Ok(meta) => Ok(meta.size),
            Err(e) => {
                log::debug!("stat {} failed: {}", remote_path, e);
                Ok(None)
            }
        }
    }

    pub async fn exists(&self, remote_path: &str) -> Result<bool, anyhow::Error> {
        let sftp = self.session()?;
        Ok(sftp.try_exists(remote_path).await?)
    }

    /// Close the SFTP session.
    pub async fn close(&mut self) -> Result<(), anyhow::Error> {
        if let Some(sftp) = self.session.take() {
            sftp.close().await?;
        }
        Ok(())
    }
}

fn join_remote(root: &str, relative: &str) -> String {
    match (root, relative) {
        (root, "") => root.to_string(),
        ("/", relative) => format!("/{}", relative),
        (root, relative) => format!("{}/{}", root, relative),
    }
}

fn in_skipped_folder(relative: &str) -> bool {
    let mut segments: Vec<&str> = relative.split('/').collect();
    // the last segment is the file name, not a folder
    segments.pop();
    segments
        .iter()
        .any(|s| s.eq_ignore_ascii_case("thumb") || s.eq_ignore_ascii_case("resized"))
}

/// Whether a listed entry (relative to the listing root) is returned.
pub(crate) fn keep_listed_file(relative: &str) -> bool {
    let relative = relative.trim_start_matches("./").trim_start_matches('/');
    if relative.is_empty()
        || relative == "."
        || relative == ".."
        || relative.ends_with("/.")
        || relative.ends_with("/..")
    {
        return false;
    }
    if in_skipped_folder(relative) {
        return false;
    }
    let basename = relative.rsplit('/').next().unwrap_or(relative);
    basename == ".gitignore" || !basename.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_regular_media() {
        assert!(keep_listed_file("media/2024/photo.jpg"));
        assert!(keep_listed_file("./uploads/doc.pdf"));
        assert!(keep_listed_file("uploads/.gitignore"));
        assert!(keep_listed_file("thumbnail.png"));
    }

    #[test]
    fn test_skips_thumbs_and_resized() {
        assert!(!keep_listed_file("uploads/thumb/photo.jpg"));
        assert!(!keep_listed_file("resized/a/b.png"));
        assert!(!keep_listed_file("uploads/Thumb/photo.jpg"));
    }

    #[test]
    fn test_skips_dotfiles_and_dir_artifacts() {
        assert!(!keep_listed_file(".env"));
        assert!(!keep_listed_file("uploads/.DS_Store"));
        assert!(!keep_listed_file("uploads/."));
        assert!(!keep_listed_file("uploads/.."));
        assert!(!keep_listed_file(""));
        assert!(!keep_listed_file(".."));
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/srv/app", ""), "/srv/app");
        assert_eq!(join_remote("/srv/app", "a/b.txt"), "/srv/app/a/b.txt");
        assert_eq!(join_remote("/", "etc"), "/etc");
    }

    #[tokio::test]
    async fn test_uninitialized_session_errors() {
        let client = SftpClient::new();
        let err = client.list_files_recursively("/tmp").await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
        let err = client.exists("/tmp").await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }
}
