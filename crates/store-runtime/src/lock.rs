//! # Shared-Memory Directory Locking
//!
//! One server per region directory. A second server on the same directory
//! would hand out descriptors for regions it does not track, so startup
//! takes an exclusive `fs2` lock (flock on Unix, LockFile on Windows) on a
//! `LOCK` file inside it.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors from directory locking
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock file could not be created
    #[error("Failed to create lock file: {0}")]
    CreateFailed(#[source] io::Error),

    /// Directory is already served by another process
    #[error("Region directory already in use{} ({})", holder(.pid), .path.display())]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    /// Failed to write PID to lock file
    #[error("Failed to write PID to lock file: {0}")]
    WriteFailed(#[source] io::Error),
}

fn holder(pid: &Option<u32>) -> String {
    pid.map(|p| format!(" by process {}", p)).unwrap_or_default()
}

// =============================================================================
// DIRECTORY LOCK
// =============================================================================

/// Exclusive lock on a region directory, released on drop.
///
/// ```ignore
/// let lock = DirectoryLock::acquire(Path::new("/dev/shm/object-store"))?;
/// ```
#[derive(Debug)]
pub struct DirectoryLock {
    file: File,
    path: PathBuf,
    pid: u32,
}

impl DirectoryLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Acquire an exclusive lock on `dir` without blocking.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        let lock_path = dir.join(Self::LOCK_FILE);

        // Not truncated on open: the holder's PID must survive a failed attempt.
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(LockError::CreateFailed)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::AlreadyLocked {
                pid: Self::read_existing_pid(&lock_path),
                path: lock_path,
            });
        }

        let pid = std::process::id();
        file.set_len(0).map_err(LockError::WriteFailed)?;
        writeln!(file, "{}", pid).map_err(LockError::WriteFailed)?;
        file.sync_all().map_err(LockError::WriteFailed)?;

        Ok(Self {
            file,
            path: lock_path,
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

// =============================================================================
// TESTS
// =============================================================================
