//! Mirror remote media (`storage/app`) into the local project.

use std::path::{Component, Path, PathBuf};

use crate::console;
use crate::error::Result;
use crate::remote::RemoteFiles;

pub const MEDIA_DIR: &str = "storage/app";

#[derive(Clone, Debug, Default)]
pub struct MediaPullOptions {
    /// Leave files that already exist locally untouched.
    pub no_overwrite: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaPullReport {
    pub downloaded: usize,
    pub skipped: usize,
}

/// `<project>/storage/app` on the remote side.
pub fn remote_media_dir(project_path: &str) -> String {
    format!("{}/{}", project_path.trim_end_matches('/'), MEDIA_DIR)
}

pub async fn pull<R>(
    remote: &R,
    remote_root: &str,
    local_root: &Path,
    options: &MediaPullOptions,
) -> Result<MediaPullReport>
where
    R: RemoteFiles + ?Sized,
{
    let mut report = MediaPullReport::default();
    if !remote.remote_exists(remote_root).await? {
        log::info!("remote media directory {} does not exist", remote_root);
        return Ok(report);
    }

    console::line("Fetching file list from remote server...");
    let files = remote.list_files_recursively(remote_root).await?;
    if files.is_empty() {
        return Ok(report);
    }

    console::line(format!("Downloading {} media files...", files.len()));
    let prefix = format!("{}/", remote_root.trim_end_matches('/'));

    for remote_file in files {
        let Some(local_file) = local_target(local_root, &prefix, &remote_file) else {
            log::warn!("skipping unexpected remote path {}", remote_file);
            report.skipped += 1;
            continue;
        };

        if let Some(parent) = local_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Ok(meta) = tokio::fs::metadata(&local_file).await {
            if options.no_overwrite {
                report.skipped += 1;
                continue;
            }
            if remote.remote_file_size(&remote_file).await? == Some(meta.len()) {
                report.skipped += 1;
                continue;
            }
        }

        remote.download_file(&remote_file, &local_file).await?;
        report.downloaded += 1;
    }

    Ok(report)
}

/// Map a listed remote file under `prefix` to its local path. Paths that
/// would escape `local_root` are rejected.
fn local_target(local_root: &Path, prefix: &str, remote_file: &str) -> Option<PathBuf> {
    let relative = Path::new(remote_file.strip_prefix(prefix)?);
    let normal = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !normal || relative.as_os_str().is_empty() {
        return None;
    }
    Some(local_root.join(relative))
}
