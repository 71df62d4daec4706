//! Filesystem collaborator: deselected-file deletion and unwanted-artifact cleanup

use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Archive extensions recognised when deriving the post-extraction name
///
/// Longer compound extensions come first so `.tar.gz` wins over `.gz`.
const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".tar.bz2", ".tar.gz", ".tar.xz", ".bz2", ".gz", ".tar", ".tbz2", ".tgz", ".lzma2", ".zip",
    ".7z", ".z", ".rar", ".iso", ".wim", ".cab", ".apm", ".arj", ".chm", ".cpio", ".cramfs",
    ".deb", ".dmg", ".fat", ".hfs", ".lzh", ".lzma", ".mbr", ".msi", ".mslz", ".nsis", ".ntfs",
    ".rpm", ".squashfs", ".udf", ".vhd", ".xar",
];

/// Multi-volume archive suffixes (`.part01.rar`, `.7z.001`, `.zip.001`)
const MULTIPART_PATTERN: &str = r"(?i)\.(part\d+\.rar|7z\.\d{3}|zip\.\d{3})$";

/// What a cleanup pass removed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Files deleted
    pub files: usize,
    /// Directories deleted
    pub dirs: usize,
}

/// Filesystem operations the dispatcher needs after a torrent finishes
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Delete `path` if it is a regular file; returns whether a file was deleted
    async fn delete_file_if_exists(&self, path: &Path) -> Result<bool>;

    /// Remove partial/stray artifacts and empty directories below `dir`
    async fn clean_unwanted(&self, dir: &Path) -> Result<CleanupSummary>;
}

/// [`FileSystem`] backed by the local disk via `tokio::fs`
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn delete_file_if_exists(&self, path: &Path) -> Result<bool> {
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Ok(false);
        }
        tokio::fs::remove_file(path).await?;
        debug!(?path, "deleted deselected file");
        Ok(true)
    }

    async fn clean_unwanted(&self, dir: &Path) -> Result<CleanupSummary> {
        info!(?dir, "cleaning unwanted files/folders");

        if tokio::fs::metadata(dir).await.is_err() {
            debug!(?dir, "output directory does not exist, skipping cleanup");
            return Ok(CleanupSummary::default());
        }

        let mut summary = CleanupSummary::default();
        remove_artifacts(dir, &mut summary).await;
        remove_empty_dirs(dir, &mut summary).await;

        info!(
            ?dir,
            deleted_files = summary.files,
            deleted_dirs = summary.dirs,
            "cleanup complete"
        );
        Ok(summary)
    }
}

/// Whether a file name is a partial or engine-private artifact
fn is_unwanted_file(name: &str) -> bool {
    name.ends_with(".!qB")
        || (name.starts_with('.') && name.ends_with(".parts"))
        || name.ends_with(".aria2")
}

/// Walk bottom-up deleting unwanted files and `.unwanted` directories
fn remove_artifacts<'a>(
    dir: &'a Path,
    summary: &'a mut CleanupSummary,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?dir, error = %e, "failed to read directory during cleanup");
                return;
            }
        };

        let mut subdirs = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };

            if file_type.is_dir() {
                subdirs.push(path);
            } else if file_type.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_unwanted_file)
            {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!(?path, "deleted unwanted file");
                        summary.files += 1;
                    }
                    Err(e) => warn!(?path, error = %e, "failed to delete file"),
                }
            }
        }

        for subdir in subdirs {
            remove_artifacts(&subdir, summary).await;
        }

        if dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(".unwanted"))
        {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {
                    debug!(?dir, "deleted unwanted folder");
                    summary.dirs += 1;
                }
                Err(e) => warn!(?dir, error = %e, "failed to delete folder"),
            }
        }
    })
}

/// Walk bottom-up removing directories that ended up empty (including `dir`)
fn remove_empty_dirs<'a>(
    dir: &'a Path,
    summary: &'a mut CleanupSummary,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return;
        };

        let mut subdirs: Vec<PathBuf> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.is_ok_and(|ft| ft.is_dir()) {
                subdirs.push(entry.path());
            }
        }
        for subdir in subdirs {
            remove_empty_dirs(&subdir, summary).await;
        }

        let is_empty = match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
            Err(_) => false,
        };
        if is_empty {
            match tokio::fs::remove_dir(dir).await {
                Ok(()) => {
                    debug!(?dir, "removed empty directory");
                    summary.dirs += 1;
                }
                Err(e) => warn!(?dir, error = %e, "failed to remove empty directory"),
            }
        }
    })
}

fn multipart_regex() -> Option<&'static Regex> {
    static MULTIPART: OnceLock<Option<Regex>> = OnceLock::new();
    MULTIPART
        .get_or_init(|| Regex::new(MULTIPART_PATTERN).ok())
        .as_ref()
}

/// Name an archive will extract to, or `None` if the extension is not a known archive
///
/// # Examples
///
/// ```
/// use download_dispatcher::fsops::archive_base_name;
///
/// assert_eq!(archive_base_name("Show.S01.tar.gz").as_deref(), Some("Show.S01"));
/// assert_eq!(archive_base_name("Movie.part01.RAR").as_deref(), Some("Movie"));
/// assert_eq!(archive_base_name("Movie.mkv"), None);
/// ```
pub fn archive_base_name(name: &str) -> Option<String> {
    if let Some(found) = multipart_regex().and_then(|re| re.find(name)) {
        return Some(name[..found.start()].to_string());
    }

    let lower = name.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| name[..name.len() - ext.len()].to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn base_name_prefers_compound_extensions() {
        assert_eq!(archive_base_name("backup.tar.bz2").as_deref(), Some("backup"));
        assert_eq!(archive_base_name("backup.TGZ").as_deref(), Some("backup"));
        assert_eq!(archive_base_name("disc.iso").as_deref(), Some("disc"));
    }

    #[test]
    fn base_name_strips_volume_suffixes() {
        assert_eq!(archive_base_name("Album.7z.001").as_deref(), Some("Album"));
        assert_eq!(archive_base_name("Album.zip.002").as_deref(), Some("Album"));
        assert_eq!(archive_base_name("Film.part12.rar").as_deref(), Some("Film"));
    }

    #[test]
    fn base_name_of_plain_file_is_none() {
        assert_eq!(archive_base_name("notes.txt"), None);
        assert_eq!(archive_base_name("folder"), None);
    }

    #[test]
    fn unwanted_file_patterns() {
        assert!(is_unwanted_file("movie.mkv.!qB"));
        assert!(is_unwanted_file(".movie.mkv.parts"));
        assert!(is_unwanted_file("movie.mkv.aria2"));
        assert!(!is_unwanted_file("movie.parts"));
        assert!(!is_unwanted_file("movie.mkv"));
    }

    #[tokio::test]
    async fn delete_file_if_exists_only_touches_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("extra.nfo");
        fs::write(&file, b"x").unwrap();

        let fs_ops = LocalFileSystem;
        assert!(fs_ops.delete_file_if_exists(&file).await.unwrap());
        assert!(!file.exists());
        assert!(!fs_ops.delete_file_if_exists(&file).await.unwrap());
        // directories are left alone
        assert!(!fs_ops.delete_file_if_exists(dir.path()).await.unwrap());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn clean_unwanted_removes_artifacts_and_empty_dirs() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("Some.Torrent");
        fs::create_dir_all(out.join("Extras/Deep")).unwrap();
        fs::create_dir_all(out.join("skipped.unwanted")).unwrap();
        fs::create_dir_all(out.join("Video")).unwrap();
        fs::write(out.join("Video/movie.mkv"), b"data").unwrap();
        fs::write(out.join("Video/.movie.mkv.parts"), b"p").unwrap();
        fs::write(out.join("Extras/Deep/sample.mkv.!qB"), b"q").unwrap();
        fs::write(out.join("skipped.unwanted/file.bin"), b"u").unwrap();

        let summary = LocalFileSystem.clean_unwanted(&out).await.unwrap();

        assert!(out.join("Video/movie.mkv").exists());
        assert!(!out.join("Video/.movie.mkv.parts").exists());
        assert!(!out.join("Extras").exists(), "emptied tree is removed");
        assert!(!out.join("skipped.unwanted").exists());
        assert_eq!(summary.files, 2);
        // skipped.unwanted, Extras/Deep, Extras
        assert_eq!(summary.dirs, 3);
    }

    #[tokio::test]
    async fn clean_unwanted_on_missing_dir_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let summary = LocalFileSystem
            .clean_unwanted(&root.path().join("gone"))
            .await
            .unwrap();
        assert_eq!(summary, CleanupSummary::default());
    }
}
