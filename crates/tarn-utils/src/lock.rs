//! Exclusive ownership of a data directory.
//!
//! Two mirrors writing the same stores would race on revisions and
//! checkpoints, so a running instance holds an `flock` on `<dir>/.lock`
//! for its whole lifetime.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};

use crate::error::{LockError, LockResult};

const LOCK_FILE: &str = ".lock";

/// An `flock`-based lock on a directory.
///
/// The lock is released when `DirLock` is dropped.
pub struct DirLock {
    _file: Flock<File>,
    path: PathBuf,
}

impl DirLock {
    /// Tries to take the lock without blocking.
    ///
    /// # Errors
    ///
    /// * [`LockError::Held`] if another process owns the directory
    /// * [`LockError::Io`] if the lock file cannot be opened
    pub fn try_acquire<P: AsRef<Path>>(dir: P) -> LockResult<Self> {
        let path = dir.as_ref().join(LOCK_FILE);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => {
                Ok(DirLock {
                    _file: file,
                    path,
                })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(LockError::Held { path }),
            Err((_, err)) => {
                Err(LockError::AcquireFailed(format!(
                    "{}: {}",
                    path.display(),
                    err
                )))
            }
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
