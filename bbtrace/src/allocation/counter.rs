//! Counter services: where block IDs come from
//!
//! [`FileCounter`] is the cross-process implementation. The file holds the
//! next ID to hand out as ASCII decimal; every allocation reads, increments
//! and rewrites it under an exclusive lock, so concurrent compiler processes
//! never see the same value.

use crate::domain::{AllocError, BlockId};
use crate::lockfile::{self, LockMode};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of process-wide unique block IDs
pub trait CounterService: Send + Sync {
    /// Hand out the next unused ID
    ///
    /// # Errors
    /// Implementation specific; see [`AllocError`].
    fn allocate(&self) -> Result<BlockId, AllocError>;
}

impl<T: CounterService + ?Sized> CounterService for Arc<T> {
    fn allocate(&self) -> Result<BlockId, AllocError> {
        (**self).allocate()
    }
}

/// Counter kept in a lock-protected file shared between processes
#[derive(Debug, Clone)]
pub struct FileCounter {
    path: PathBuf,
    lock_timeout: Option<Duration>,
}

impl FileCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock_timeout: None }
    }

    /// Fail with a lock timeout instead of waiting forever for other allocators
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File, AllocError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| AllocError::Open { path: self.path.clone(), source })
    }

    fn read_value(&self, mut file: &File) -> Result<u32, AllocError> {
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(|source| AllocError::Read { path: self.path.clone(), source })?;
        Ok(parse_counter(&raw, &self.path))
    }

    /// Start a new session: the next allocation returns 0
    ///
    /// IDs handed out before the reset are no longer unique with respect to
    /// IDs handed out after it.
    ///
    /// # Errors
    /// Returns an error naming the path if the file cannot be opened, locked
    /// or truncated.
    pub fn reset(&self) -> Result<(), AllocError> {
        let file = self.open()?;
        let _lock = lockfile::lock(&file, &self.path, LockMode::Exclusive, self.lock_timeout)?;
        file.set_len(0).map_err(|source| AllocError::Write { path: self.path.clone(), source })?;
        debug!("Reset block counter {}", self.path.display());
        Ok(())
    }

    /// Next ID that would be allocated, without allocating it
    ///
    /// # Errors
    /// Returns an error naming the path if the file cannot be opened, locked
    /// or read.
    pub fn peek(&self) -> Result<u32, AllocError> {
        let file = self.open()?;
        let _lock = lockfile::lock(&file, &self.path, LockMode::Shared, self.lock_timeout)?;
        self.read_value(&file)
    }
}

impl CounterService for FileCounter {
    fn allocate(&self) -> Result<BlockId, AllocError> {
        let file = self.open()?;
        let _lock = lockfile::lock(&file, &self.path, LockMode::Exclusive, self.lock_timeout)?;

        let current = self.read_value(&file)?;
        let next = current.checked_add(1).ok_or_else(|| AllocError::Exhausted {
            counter: self.path.display().to_string(),
        })?;

        let encoded = next.to_string();
        let write_err = |source| AllocError::Write { path: self.path.clone(), source };
        let mut handle = &file;
        handle.seek(SeekFrom::Start(0)).map_err(write_err)?;
        handle.write_all(encoded.as_bytes()).map_err(write_err)?;
        file.set_len(encoded.len() as u64).map_err(write_err)?;

        Ok(BlockId(current))
    }
}

/// Parse counter file contents; anything unusable counts as 0
fn parse_counter(raw: &[u8], path: &Path) -> u32 {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    text.parse().unwrap_or_else(|_| {
        warn!("Block counter {} holds {text:?}, not an integer; restarting at 0", path.display());
        0
    })
}

/// Counter living in this process only
///
/// Same contract as [`FileCounter`] within one process, for tests and
/// single-process instrumenters.
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    next: AtomicU32,
}

impl InMemoryCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn starting_at(next: u32) -> Self {
        Self { next: AtomicU32::new(next) }
    }
}

impl CounterService for InMemoryCounter {
    fn allocate(&self) -> Result<BlockId, AllocError> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map(BlockId)
            .map_err(|_| AllocError::Exhausted { counter: "in-memory counter".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    #[test]
    fn test_fresh_file_counts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let counter = FileCounter::new(dir.path().join("block_counter"));

        let ids: Vec<u32> = (0..4).map(|_| counter.allocate().unwrap().0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(fs::read_to_string(counter.path()).unwrap(), "4");
    }

    #[test]
    fn test_stale_trailing_content_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block_counter");
        fs::write(&path, "7\n\n\n   ").unwrap();

        let counter = FileCounter::new(&path);
        assert_eq!(counter.allocate().unwrap(), BlockId(7));
        assert_eq!(fs::read_to_string(&path).unwrap(), "8");
    }

    #[test]
    fn test_garbage_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block_counter");
        fs::write(&path, "not a number").unwrap();

        let counter = FileCounter::new(&path);
        assert_eq!(counter.allocate().unwrap(), BlockId(0));
        assert_eq!(counter.peek().unwrap(), 1);
    }

    #[test]
    fn test_exhausted_counter_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block_counter");
        fs::write(&path, u32::MAX.to_string()).unwrap();

        let err = FileCounter::new(&path).allocate().unwrap_err();
        assert!(matches!(err, AllocError::Exhausted { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), u32::MAX.to_string());
    }

    #[test]
    fn test_reset_starts_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let counter = FileCounter::new(dir.path().join("block_counter"));
        counter.allocate().unwrap();
        counter.allocate().unwrap();

        counter.reset().unwrap();
        assert_eq!(counter.peek().unwrap(), 0);
        assert_eq!(counter.allocate().unwrap(), BlockId(0));
    }

    #[test]
    fn test_unusable_path_reports_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let counter = FileCounter::new(dir.path().join("no-such-dir").join("block_counter"));
        let err = counter.allocate().unwrap_err();
        assert!(matches!(err, AllocError::Open { .. }));
    }

    #[test]
    fn test_concurrent_threads_get_distinct_ids() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;
        let dir = tempfile::tempdir().unwrap();
        let counter = FileCounter::new(dir.path().join("block_counter"));

        let ids: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let counter = &counter;
                    s.spawn(move || {
                        (0..PER_THREAD).map(|_| counter.allocate().unwrap().0).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let total = THREADS * PER_THREAD;
        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(ids.len(), total);
        assert_eq!(unique, (0..total as u32).collect());
    }

    #[test]
    fn test_in_memory_counter() {
        let counter = InMemoryCounter::starting_at(u32::MAX - 1);
        assert_eq!(counter.allocate().unwrap(), BlockId(u32::MAX - 1));
        assert!(matches!(counter.allocate(), Err(AllocError::Exhausted { .. })));
    }
}
