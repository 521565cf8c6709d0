//! Host-wide advisory lock serializing writers of the user table.
//!
//! Uses OS-level file locking (`flock` on Unix, `LockFileEx` on Windows), so
//! only participants that take the lock are serialized. The lock is released
//! when the guard is dropped, including on error paths.

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::errors::StoreError;

/// Exclusive hold on the lock file; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

fn is_contended(e: &io::Error) -> bool {
    // EWOULDBLOCK/EAGAIN is 11 on Linux, 35 on macOS
    e.kind() == io::ErrorKind::WouldBlock || matches!(e.raw_os_error(), Some(11) | Some(35))
}

impl StoreLock {
    /// Take the lock without blocking, retrying `retries` times with `backoff` between attempts.
    ///
    /// Blocks the calling thread while backing off; run it on a blocking pool.
    ///
    /// # Errors
    ///
    /// - [`StoreError::LockContended`] if another holder kept the lock for every attempt
    /// - [`StoreError::Lock`] if the lock file cannot be created or locked
    pub fn acquire(path: &Path, retries: u32, backoff: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Lock { path: path.to_path_buf(), source })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| StoreError::Lock { path: path.to_path_buf(), source })?;

        let mut attempt = 0;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), attempt, "store lock acquired");
                    return Ok(Self { file, path: path.to_path_buf() });
                }
                Err(e) if is_contended(&e) => {
                    if attempt >= retries {
                        warn!(path = %path.display(), attempts = attempt + 1, "store lock contended");
                        return Err(StoreError::LockContended(path.to_path_buf()));
                    }
                    attempt += 1;
                    thread::sleep(backoff);
                }
                Err(source) => return Err(StoreError::Lock { path: path.to_path_buf(), source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        } else {
            debug!(path = %self.path.display(), "store lock released");
        }
    }
}
