//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Suffix appended to a final path while its contents are being streamed
pub const STAGING_SUFFIX: &str = ".temp";

/// Maximum number of `name (n).ext` candidates tried when the save path is taken
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Staging path for `final_path`: the same path with [`STAGING_SUFFIX`] appended
///
/// # Examples
///
/// ```
/// use media_dl::utils::staging_path;
/// use std::path::Path;
///
/// assert_eq!(
///     staging_path(Path::new("/tmp/42 - clip.mp4")),
///     Path::new("/tmp/42 - clip.mp4.temp")
/// );
/// ```
pub fn staging_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Size of a regular file, or `None` if it does not exist
pub async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Whether `path` already holds a file of exactly `expected_size` bytes
pub async fn is_file_duplicate(path: &Path, expected_size: u64) -> bool {
    file_size(path).await == Some(expected_size)
}

/// Move a file, falling back to copy + delete across filesystems
///
/// Any failure is reported as [`Error::Relocation`].
pub async fn move_file(source: &Path, dest: &Path) -> Result<()> {
    let relocation = |reason: String| Error::Relocation {
        source_path: source.to_path_buf(),
        dest_path: dest.to_path_buf(),
        reason,
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| relocation(format!("cannot create destination directory: {e}")))?;
    }

    match tokio::fs::rename(source, dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                ?source,
                ?dest,
                "rename crosses filesystems, copying instead"
            );
            tokio::fs::copy(source, dest)
                .await
                .map_err(|e| relocation(format!("copy failed: {e}")))?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| relocation(format!("removing source after copy failed: {e}")))?;
            Ok(())
        }
        Err(e) => Err(relocation(e.to_string())),
    }
}

/// Move a finished file into the save directory
///
/// An existing file at `dest` is never replaced; the file is saved under the
/// first free `name (n).ext` next to it instead. Returns where it ended up.
pub async fn move_to_save_directory(source: &Path, dest: &Path) -> Result<PathBuf> {
    let dest = unique_path(dest).await?;
    move_file(source, &dest).await?;
    tracing::debug!(?source, ?dest, "moved file to save directory");
    Ok(dest)
}

/// `path` if nothing exists there, otherwise the first free `stem (n).ext`
pub async fn unique_path(path: &Path) -> Result<PathBuf> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(path.to_path_buf());
    }

    let collision = |reason: &str| Error::FileCollision {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| collision("cannot extract file stem"))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path
        .parent()
        .ok_or_else(|| collision("cannot extract parent directory"))?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = parent.join(match extension {
            Some(ext) => format!("{stem} ({i}).{ext}"),
            None => format!("{stem} ({i})"),
        });
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Ok(candidate);
        }
    }
    Err(collision("no free file name left"))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn staging_path_appends_suffix_without_touching_extension() {
        assert_eq!(
            staging_path(Path::new("dir/archive.tar.gz")),
            PathBuf::from("dir/archive.tar.gz.temp")
        );
        assert_eq!(staging_path(Path::new("noext")), PathBuf::from("noext.temp"));
    }

    #[tokio::test]
    async fn duplicate_detection_compares_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"12345").unwrap();

        assert!(is_file_duplicate(&path, 5).await);
        assert!(!is_file_duplicate(&path, 6).await);
        assert!(!is_file_duplicate(&dir.path().join("missing"), 0).await);
        assert_eq!(file_size(dir.path()).await, None, "directories have no size");
    }

    #[tokio::test]
    async fn move_file_creates_destination_directories() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src.bin");
        let dest = dir.path().join("nested").join("deeper").join("dest.bin");
        fs::write(&source, b"data").unwrap();

        move_file(&source, &dest).await.unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"data");
    }

    #[tokio::test]
    async fn move_missing_source_is_a_relocation_error() {
        let dir = TempDir::new().unwrap();
        let err = move_file(&dir.path().join("absent"), &dir.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Relocation { .. }));
    }

    #[tokio::test]
    async fn save_directory_move_keeps_existing_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("new.bin");
        let dest = dir.path().join("existing.bin");
        fs::write(&source, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();
        fs::write(dir.path().join("existing (1).bin"), b"older").unwrap();

        let saved = move_to_save_directory(&source, &dest).await.unwrap();
        assert_eq!(saved, dir.path().join("existing (2).bin"));
        assert_eq!(fs::read(&saved).unwrap(), b"new");
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn unique_path_without_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("README");
        assert_eq!(unique_path(&path).await.unwrap(), path);

        fs::write(&path, b"x").unwrap();
        assert_eq!(unique_path(&path).await.unwrap(), dir.path().join("README (1)"));
    }

    #[tokio::test]
    async fn save_directory_move_returns_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("new.bin");
        let dest = dir.path().join("out").join("new.bin");
        fs::write(&source, b"new").unwrap();

        let path = move_to_save_directory(&source, &dest).await.unwrap();
        assert_eq!(path, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }
}
