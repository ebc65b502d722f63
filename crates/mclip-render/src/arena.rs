//! Per-request scratch directory.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::{debug, warn};

use crate::error::{RenderError, RenderResult};

/// Exclusively owned scratch directory for one render.
///
/// Named `render-<request id>` under the work dir, without a random suffix,
/// so identical requests produce identical intermediate paths. Ownership is
/// an exclusive `flock` on a sibling `.lock` file, held for the arena's
/// lifetime; a second arena for the same id fails instead of sharing the
/// directory. The directory and everything in it is removed on drop.
pub struct ScratchArena {
    // Field order matters: the directory is removed before the lock is released.
    dir: TempDir,
    _lock: Flock<File>,
}

impl ScratchArena {
    /// Create the arena, clearing any leftover from an earlier crashed run.
    ///
    /// Fails with [`RenderError::ArenaInUse`] while another arena for the
    /// same id is alive.
    pub async fn create(work_dir: &Path, request_id: &str) -> RenderResult<Self> {
        tokio::fs::create_dir_all(work_dir).await?;

        let name = arena_name(request_id);
        let path = work_dir.join(&name);
        let lock = lock_arena(&work_dir.join(format!("{}.lock", name)), &path).await?;

        // Holding the lock means no live render owns this directory
        if tokio::fs::try_exists(&path).await? {
            warn!(path = %path.display(), "Removing stale scratch arena");
            tokio::fs::remove_dir_all(&path).await?;
        }

        let dir = Builder::new()
            .prefix(&name)
            .rand_bytes(0)
            .tempdir_in(work_dir)?;
        debug!(path = %dir.path().display(), "Created scratch arena");
        Ok(Self { dir, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of an artifact inside the arena.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the arena now, reporting failures that drop would swallow.
    pub async fn close(self) -> io::Result<()> {
        let Self { dir, _lock: lock } = self;
        let result = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(io::Error::other)?;
        drop(lock);
        result
    }
}

impl std::fmt::Debug for ScratchArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchArena")
            .field("path", &self.dir.path())
            .finish()
    }
}

async fn lock_arena(lock_path: &Path, arena_path: &Path) -> RenderResult<Flock<File>> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .await?
        .into_std()
        .await;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(lock),
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
            Err(RenderError::ArenaInUse(arena_path.to_path_buf()))
        }
        Err((_, errno)) => Err(io::Error::from(errno).into()),
    }
}

/// `render-` plus the id, with every byte outside `[A-Za-z0-9-]` written
/// as `_xx` hex so distinct ids never share a directory.
fn arena_name(request_id: &str) -> String {
    let mut name = String::from("render-");
    for byte in request_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("_{:02x}", byte));
        }
    }
    name
}
