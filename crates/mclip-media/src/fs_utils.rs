//! Filesystem helpers: publishing files across devices and disk-space checks.

use nix::errno::Errno;
use nix::sys::statvfs::statvfs;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, warn};

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a rename first. On EXDEV it copies to a sibling of `dst`, renames
/// that into place and removes `src`, so `dst` never holds a half-written
/// file. Parent directories of `dst` are created as needed; an existing
/// `dst` is replaced.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.exists() {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(Errno::EXDEV as i32)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let mut partial = dst.as_os_str().to_owned();
    partial.push(".partial");
    let partial = std::path::PathBuf::from(partial);

    if let Err(e) = fs::copy(src, &partial).await {
        error!(
            "Copy failed during cross-device move: {} -> {}: {}",
            src.display(),
            partial.display(),
            e
        );
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    // dst is complete at this point; a leftover src is only wasted space
    if let Err(e) = fs::remove_file(src).await {
        warn!(
            "Failed to remove source after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
///
/// `path` need not exist yet; its nearest existing ancestor is measured.
pub fn available_space(path: &Path) -> MediaResult<u64> {
    let existing = path
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or_else(|| Path::new("."));

    let stats = statvfs(existing).map_err(std::io::Error::from)?;
    Ok((stats.blocks_available() as u64).saturating_mul(stats.fragment_size() as u64))
}

/// Fail with [`MediaError::InsufficientDiskSpace`] unless `required` bytes
/// are free under `dir`.
pub fn ensure_disk_space(dir: &Path, required: u64) -> MediaResult<()> {
    if required == 0 {
        return Ok(());
    }
    let available = available_space(dir)?;
    if available < required {
        return Err(MediaError::InsufficientDiskSpace {
            required,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("render.mp4");
        let dst = dir.path().join("published.mp4");

        fs::write(&src, b"frames").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "frames");
    }

    #[tokio::test]
    async fn test_move_file_creates_parent_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("render.mp4");
        let dst = dir.path().join("out").join("nested").join("moment.mp4");
        fs::create_dir_all(dst.parent().unwrap()).await.unwrap();
        fs::write(&dst, b"stale").await.unwrap();

        fs::write(&src, b"fresh").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_move_missing_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = move_file(dir.path().join("nope.mp4"), dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_copy_and_delete_leaves_no_partial() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("b.mp4");
        fs::write(&src, b"data").await.unwrap();

        copy_and_delete(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert!(dst.exists());
        assert!(!dir.path().join("b.mp4.partial").exists());
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(
            Errno::EXDEV as i32
        )));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(
            Errno::ENOENT as i32
        )));
    }

    #[test]
    fn test_available_space_walks_to_existing_ancestor() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("not").join("yet").join("created");
        let here = available_space(dir.path()).unwrap();
        let there = available_space(&missing).unwrap();
        assert!(here > 0);
        // Same filesystem; allow for concurrent churn
        assert!(there.abs_diff(here) < 1 << 30);
    }

    #[test]
    fn test_ensure_disk_space() {
        let dir = TempDir::new().unwrap();
        ensure_disk_space(dir.path(), 0).unwrap();
        ensure_disk_space(dir.path(), 1).unwrap();
        let err = ensure_disk_space(dir.path(), u64::MAX).unwrap_err();
        assert!(matches!(err, MediaError::InsufficientDiskSpace { .. }));
    }
}
