//! Block ID allocator used by instrumenters
//!
//! Wraps a [`CounterService`] with the failure policy instrumenters rely on:
//! allocation never fails. When the counter is missing or broken the
//! allocator logs why and hands out [`BlockId::SENTINEL`], and the build
//! carries on without the uniqueness guarantee.

use super::counter::{CounterService, FileCounter};
use crate::domain::{AllocError, BlockId};
use bbtrace_common::env::BLOCK_COUNTER_FILE;
use log::{error, warn};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct BlockIdAllocator {
    service: Option<Box<dyn CounterService>>,
    warned_degraded: AtomicBool,
}

impl BlockIdAllocator {
    pub fn new(service: impl CounterService + 'static) -> Self {
        Self { service: Some(Box::new(service)), warned_degraded: AtomicBool::new(false) }
    }

    /// Allocator without a counter: every block gets the sentinel
    #[must_use]
    pub fn degraded() -> Self {
        Self { service: None, warned_degraded: AtomicBool::new(false) }
    }

    /// File-backed allocator, or a degraded one if no path is given
    #[must_use]
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Self::new(FileCounter::new(path)),
            None => {
                error!("Block counter file is not set; all blocks get ID {}", BlockId::SENTINEL);
                Self::degraded()
            }
        }
    }

    /// File-backed allocator at `BLOCK_COUNTER_FILE`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_counter_var(std::env::var_os(BLOCK_COUNTER_FILE))
    }

    fn from_counter_var(value: Option<OsString>) -> Self {
        match value.filter(|p| !p.is_empty()) {
            Some(path) => Self::new(FileCounter::new(PathBuf::from(path))),
            None => {
                error!(
                    "Environment variable {BLOCK_COUNTER_FILE} is not set; all blocks get ID {}",
                    BlockId::SENTINEL
                );
                Self::degraded()
            }
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.service.is_none()
    }

    /// Allocate, reporting failures to the caller
    ///
    /// # Errors
    /// [`AllocError::NotConfigured`] in degraded mode, otherwise whatever the
    /// counter service reports.
    pub fn try_allocate(&self) -> Result<BlockId, AllocError> {
        self.service.as_ref().ok_or(AllocError::NotConfigured)?.allocate()
    }

    /// Allocate, falling back to [`BlockId::SENTINEL`] on any failure
    pub fn allocate(&self) -> BlockId {
        match self.try_allocate() {
            Ok(id) => id,
            Err(AllocError::NotConfigured) => {
                if !self.warned_degraded.swap(true, Ordering::Relaxed) {
                    warn!("No block counter configured; IDs are not unique");
                }
                BlockId::SENTINEL
            }
            Err(e) => {
                warn!("Block ID allocation failed, using {}: {e}", BlockId::SENTINEL);
                BlockId::SENTINEL
            }
        }
    }
}

impl std::fmt::Debug for BlockIdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockIdAllocator").field("degraded", &self.is_degraded()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::InMemoryCounter;
    use log::{Level, Log, Metadata, Record};
    use std::sync::{Arc, Mutex};
    use std::thread::ThreadId;

    /// Error-level messages, tagged with the thread that logged them
    struct ErrorCapture(Mutex<Vec<(ThreadId, String)>>);

    impl Log for ErrorCapture {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Error
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                let entry = (std::thread::current().id(), record.args().to_string());
                self.0.lock().unwrap().push(entry);
            }
        }

        fn flush(&self) {}
    }

    static ERRORS: ErrorCapture = ErrorCapture(Mutex::new(Vec::new()));

    fn errors_logged_by(f: impl FnOnce()) -> Vec<String> {
        // Another test may have installed it already
        let _ = log::set_logger(&ERRORS);
        log::set_max_level(log::LevelFilter::Error);
        let me = std::thread::current().id();
        let before = ERRORS.0.lock().unwrap().iter().filter(|(t, _)| *t == me).count();
        f();
        let logged = ERRORS.0.lock().unwrap();
        logged.iter().filter(|(t, _)| *t == me).skip(before).map(|(_, m)| m.clone()).collect()
    }

    #[test]
    fn test_allocates_from_service() {
        let allocator = BlockIdAllocator::new(InMemoryCounter::starting_at(40));
        assert_eq!(allocator.allocate(), BlockId(40));
        assert_eq!(allocator.allocate(), BlockId(41));
        assert!(!allocator.is_degraded());
    }

    #[test]
    fn test_degraded_mode_returns_sentinel() {
        let allocator = BlockIdAllocator::from_path(None);
        assert!(allocator.is_degraded());
        assert_eq!(allocator.allocate(), BlockId::SENTINEL);
        assert_eq!(allocator.allocate(), BlockId::SENTINEL);
        assert!(matches!(allocator.try_allocate(), Err(AllocError::NotConfigured)));
    }

    #[test]
    fn test_empty_path_is_degraded() {
        assert!(BlockIdAllocator::from_path(Some(PathBuf::new())).is_degraded());
    }

    #[test]
    fn test_unusable_counter_falls_back_to_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let allocator =
            BlockIdAllocator::from_path(Some(dir.path().join("missing").join("block_counter")));
        assert!(!allocator.is_degraded());
        assert_eq!(allocator.allocate(), BlockId::SENTINEL);
        assert!(matches!(allocator.try_allocate(), Err(AllocError::Open { .. })));
    }

    #[test]
    fn test_allocators_sharing_a_service() {
        let shared = Arc::new(InMemoryCounter::new());
        let a = BlockIdAllocator::new(Arc::clone(&shared));
        let b = BlockIdAllocator::new(shared);
        assert_eq!(a.allocate(), BlockId(0));
        assert_eq!(b.allocate(), BlockId(1));
        assert_eq!(a.allocate(), BlockId(2));
    }

    #[test]
    fn test_unset_counter_variable_reported_once() {
        let messages = errors_logged_by(|| {
            assert!(BlockIdAllocator::from_counter_var(None).is_degraded());
        });
        assert_eq!(messages.len(), 1, "{messages:?}");
        assert!(messages[0].contains(BLOCK_COUNTER_FILE));
    }

    #[test]
    fn test_counter_variable_selects_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block_counter");
        let allocator = BlockIdAllocator::from_counter_var(Some(path.clone().into_os_string()));
        assert_eq!(allocator.allocate(), BlockId(0));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "1");
        assert!(BlockIdAllocator::from_counter_var(Some(OsString::new())).is_degraded());
    }
}
