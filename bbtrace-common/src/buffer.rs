//! Memory-mapped trace buffer
//!
//! A [`TraceBuffer`] is a shared, read-write mapping of the backing file. Any
//! number of processes may map the same file; they coordinate only through
//! the atomic counter cell. Each `record` reserves a slot with one
//! `fetch_add` and, if the slot exists, stores the block ID into it. Slots are
//! written once per reservation and never revisited.
//!
//! Once the counter passes the capacity, records are dropped but still
//! counted, so readers detect truncation by comparing the two.

#![allow(unsafe_code)] // memory mapping and atomics over mapped memory

use crate::error::BufferError;
use crate::layout::{buffer_size, capacity_for_size, CELL_SIZE, COUNTER_OFFSET, ENTRIES_OFFSET};
use crate::BlockId;
use fs2::FileExt;
use log::{debug, info};
use memmap2::{Mmap, MmapOptions, MmapRaw};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Owned read-write mapping of a trace buffer file
///
/// The mapping is released when the handle is dropped; [`TraceBuffer::close`]
/// additionally flushes it to the backing file first.
pub struct TraceBuffer {
    map: MmapRaw,
    capacity: u32,
    path: PathBuf,
}

impl TraceBuffer {
    /// Create or truncate the backing file for a buffer of `capacity` entries
    ///
    /// The file ends up zero-filled (counter 0, all slots 0) and exactly
    /// [`buffer_size`] bytes long. Must not run while another process is
    /// tracing into the same file.
    ///
    /// # Errors
    /// Returns an error naming the path if the file or its parent directory
    /// cannot be created or resized.
    pub fn provision(path: impl AsRef<Path>, capacity: u32) -> Result<(), BufferError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(BufferError::EmptyPath);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| BufferError::Open { path: parent.to_path_buf(), source })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| BufferError::Open { path: path.to_path_buf(), source })?;

        let bytes = buffer_size(capacity);
        file.set_len(bytes)
            .map_err(|source| BufferError::Resize { path: path.to_path_buf(), bytes, source })?;

        info!("Provisioned trace buffer {} ({capacity} entries, {bytes} bytes)", path.display());
        Ok(())
    }

    /// Open a buffer for recording, creating it if necessary
    ///
    /// An empty or missing file is sized for `capacity` entries. A file that
    /// already has content keeps its size and its capacity is derived from it,
    /// so whoever provisioned the buffer decides how large it is.
    ///
    /// # Errors
    /// - The file cannot be opened, locked, resized or mapped
    /// - An existing file is shorter than one counter cell
    pub fn open(path: impl AsRef<Path>, capacity: u32) -> Result<Self, BufferError> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(BufferError::EmptyPath);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| BufferError::Open { path: path.clone(), source })?;

        let capacity = Self::size_or_adopt(&file, &path, capacity)?;
        let map = Self::map_shared(&file, &path, capacity)?;

        debug!("Mapped trace buffer {} ({capacity} entries)", path.display());
        Ok(Self { map, capacity, path })
    }

    /// Size a fresh file, or derive the capacity of an existing one
    ///
    /// Held under an exclusive lock so two processes starting at once agree on
    /// the size before either maps the file.
    fn size_or_adopt(file: &File, path: &Path, capacity: u32) -> Result<u32, BufferError> {
        file.lock_exclusive()
            .map_err(|source| BufferError::Open { path: path.to_path_buf(), source })?;

        let result = (|| {
            let len = file
                .metadata()
                .map_err(|source| BufferError::Open { path: path.to_path_buf(), source })?
                .len();

            if len == 0 {
                let bytes = buffer_size(capacity);
                file.set_len(bytes).map_err(|source| BufferError::Resize {
                    path: path.to_path_buf(),
                    bytes,
                    source,
                })?;
                debug!("Created trace buffer {} with {bytes} bytes", path.display());
                return Ok(capacity);
            }

            capacity_for_size(len)
                .ok_or_else(|| BufferError::Truncated { path: path.to_path_buf(), actual: len })
        })();

        // Unlock failures are harmless: the lock goes away with the descriptor.
        let _ = FileExt::unlock(file);
        result
    }

    fn map_shared(file: &File, path: &Path, capacity: u32) -> Result<MmapRaw, BufferError> {
        let len = mapping_len(path, capacity)?;
        // SAFETY: the file is at least `len` bytes (sized or checked above).
        // Concurrent modification by other processes is expected; all access
        // to the mapped memory goes through `AtomicU32`.
        unsafe { MmapOptions::new().len(len).map_raw(file) }
            .map_err(|source| BufferError::Map { path: path.to_path_buf(), source })
    }

    fn counter(&self) -> &AtomicU32 {
        // SAFETY: the mapping is page-aligned, at least one cell long, and
        // lives as long as `self`. `AtomicU32` has the layout of `u32`.
        unsafe { &*self.map.as_mut_ptr().add(COUNTER_OFFSET).cast::<AtomicU32>() }
    }

    fn slot(&self, index: u32) -> &AtomicU32 {
        debug_assert!(index < self.capacity);
        let offset = ENTRIES_OFFSET + index as usize * CELL_SIZE;
        // SAFETY: `index < capacity`, so the cell lies inside the mapping and
        // is 4-byte aligned.
        unsafe { &*self.map.as_mut_ptr().add(offset).cast::<AtomicU32>() }
    }

    /// Record a visit to `id`
    ///
    /// Returns `false` when the buffer is full and the visit was only counted.
    /// Wait-free: one atomic add, then at most one atomic store.
    ///
    /// The counter is a `u32` and wraps to 0 after 2^32 records. Past that
    /// point slots are reused and the count restarts, so a wrapped buffer
    /// reads back as a short trace with no truncation flag.
    #[inline]
    pub fn record(&self, id: BlockId) -> bool {
        let index = self.counter().fetch_add(1, Ordering::AcqRel);
        if index < self.capacity {
            self.slot(index).store(id.0, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Number of attempted records, including dropped ones
    #[must_use]
    pub fn recorded(&self) -> u32 {
        self.counter().load(Ordering::Acquire)
    }

    /// Number of entry slots
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether records have been dropped for lack of space
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.recorded() > self.capacity
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the stored entries in slot order
    ///
    /// Not synchronized against concurrent writers: a slot reserved but not
    /// yet stored reads as whatever it held before.
    #[must_use]
    pub fn snapshot(&self) -> TraceSnapshot {
        let recorded = self.recorded();
        let stored = recorded.min(self.capacity);
        let entries = (0..stored).map(|i| BlockId(self.slot(i).load(Ordering::Acquire))).collect();
        TraceSnapshot { recorded, capacity: self.capacity, entries }
    }

    /// Flush the mapping to the backing file
    ///
    /// # Errors
    /// Returns an error naming the path if `msync` fails.
    pub fn flush(&self) -> Result<(), BufferError> {
        self.map
            .flush()
            .map_err(|source| BufferError::Flush { path: self.path.clone(), source })
    }

    /// Flush and unmap
    ///
    /// # Errors
    /// Returns an error naming the path if the final flush fails. The mapping
    /// is released either way.
    pub fn close(self) -> Result<(), BufferError> {
        let result = self.flush();
        debug!("Unmapped trace buffer {}", self.path.display());
        drop(self);
        result
    }
}

impl std::fmt::Debug for TraceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceBuffer")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("recorded", &self.recorded())
            .finish()
    }
}

/// Point-in-time copy of a trace buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceSnapshot {
    /// Counter value: attempted records, including dropped ones
    pub recorded: u32,
    pub capacity: u32,
    /// The first `min(recorded, capacity)` slots, in slot order
    pub entries: Vec<BlockId>,
}

impl TraceSnapshot {
    /// Records that were counted but not stored
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.recorded.saturating_sub(self.capacity)
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.recorded > self.capacity
    }
}

fn mapping_len(path: &Path, capacity: u32) -> Result<usize, BufferError> {
    usize::try_from(buffer_size(capacity)).map_err(|_| BufferError::Map {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "buffer does not fit in the address space",
        ),
    })
}

fn read_cell(bytes: &[u8], offset: usize) -> u32 {
    let mut cell = [0u8; CELL_SIZE];
    cell.copy_from_slice(&bytes[offset..offset + CELL_SIZE]);
    u32::from_ne_bytes(cell)
}

/// Read a buffer of known capacity without mapping it writable
///
/// Yields `min(counter, capacity)` entries in slot order. Meant for use after
/// tracing has quiesced; concurrent writers are not synchronized against.
///
/// # Errors
/// - The file cannot be opened or mapped
/// - The file is smaller than [`buffer_size`]`(capacity)`
pub fn inspect(path: impl AsRef<Path>, capacity: u32) -> Result<TraceSnapshot, BufferError> {
    let path = path.as_ref();
    let file =
        File::open(path).map_err(|source| BufferError::Open { path: path.to_path_buf(), source })?;
    let actual = file
        .metadata()
        .map_err(|source| BufferError::Open { path: path.to_path_buf(), source })?
        .len();

    let expected = buffer_size(capacity);
    if actual < expected {
        return Err(BufferError::TooSmall { path: path.to_path_buf(), expected, actual });
    }

    let len = mapping_len(path, capacity)?;
    // SAFETY: read-only mapping of a file at least `len` bytes long; contents
    // are copied out immediately.
    let map: Mmap = unsafe { MmapOptions::new().len(len).map(&file) }
        .map_err(|source| BufferError::Map { path: path.to_path_buf(), source })?;

    let recorded = read_cell(&map, COUNTER_OFFSET);
    let stored = recorded.min(capacity) as usize;
    let entries = (0..stored)
        .map(|i| BlockId(read_cell(&map, ENTRIES_OFFSET + i * CELL_SIZE)))
        .collect();

    Ok(TraceSnapshot { recorded, capacity, entries })
}

/// Read a buffer, taking its capacity from the file size
///
/// # Errors
/// Same as [`inspect`], plus [`BufferError::Truncated`] for files shorter
/// than one counter cell.
pub fn inspect_auto(path: impl AsRef<Path>) -> Result<TraceSnapshot, BufferError> {
    let path = path.as_ref();
    let actual = fs::metadata(path)
        .map_err(|source| BufferError::Open { path: path.to_path_buf(), source })?
        .len();
    let capacity = capacity_for_size(actual)
        .ok_or_else(|| BufferError::Truncated { path: path.to_path_buf(), actual })?;
    inspect(path, capacity)
}
