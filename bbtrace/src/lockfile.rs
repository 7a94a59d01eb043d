//! Advisory whole-file locks for the shared control files
//!
//! The counter file and the metadata store are only ever read-modify-written
//! while holding one of these. Locks are `flock(2)`-style: they exclude other
//! processes and other open descriptors in this process alike, and vanish
//! with the descriptor if the holder dies.

use crate::domain::LockError;
use fs2::FileExt;
use log::debug;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

/// Poll interval for bounded waits
const RETRY_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Exclusive,
    Shared,
}

/// Held lock; released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct FileLock<'a> {
    file: &'a File,
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock too, so a failure here is harmless.
        let _ = FileExt::unlock(self.file);
    }
}

fn try_acquire(file: &File, mode: LockMode) -> std::io::Result<()> {
    match mode {
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
        LockMode::Shared => FileExt::try_lock_shared(file),
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind()
        || err.kind() == std::io::ErrorKind::WouldBlock
}

/// Lock `file`, blocking until the lock is granted
///
/// With `timeout` set, gives up with [`LockError::Timeout`] once the deadline
/// passes instead of waiting forever.
///
/// # Errors
/// - The lock syscall fails for a reason other than contention
/// - The bounded wait expires
pub fn lock<'a>(
    file: &'a File,
    path: &Path,
    mode: LockMode,
    timeout: Option<Duration>,
) -> Result<FileLock<'a>, LockError> {
    let failed = |source| LockError::Failed { path: path.to_path_buf(), source };

    let Some(timeout) = timeout else {
        match mode {
            LockMode::Exclusive => FileExt::lock_exclusive(file).map_err(failed)?,
            LockMode::Shared => FileExt::lock_shared(file).map_err(failed)?,
        }
        return Ok(FileLock { file });
    };

    let start = Instant::now();
    loop {
        match try_acquire(file, mode) {
            Ok(()) => return Ok(FileLock { file }),
            Err(e) if is_contended(&e) => {
                let waited = start.elapsed();
                if waited >= timeout {
                    return Err(LockError::Timeout { path: path.to_path_buf(), waited });
                }
                debug!("Waiting for {mode:?} lock on {}", path.display());
                std::thread::sleep(RETRY_INTERVAL.min(timeout - waited));
            }
            Err(e) => return Err(failed(e)),
        }
    }
}
