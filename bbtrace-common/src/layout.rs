//! Byte layout of the trace buffer file
//!
//! A native-endian `u32` counter cell followed by `capacity` `u32` entries.
//! The counter holds attempted records, so it exceeds `capacity` once the
//! buffer overflows. Being 32 bits wide it wraps after 2^32 records; a
//! wrapped counter is indistinguishable from a short trace.

/// Size of one cell (the counter or an entry) in bytes
pub const CELL_SIZE: usize = std::mem::size_of::<u32>();

/// Byte offset of the counter cell
pub const COUNTER_OFFSET: usize = 0;

/// Byte offset of `entry[0]`
pub const ENTRIES_OFFSET: usize = COUNTER_OFFSET + CELL_SIZE;

/// Total file size used by the runtime when nothing was provisioned: 512 MiB
pub const DEFAULT_BUFFER_BYTES: u64 = 512 * 1024 * 1024;

/// Entry capacity of a [`DEFAULT_BUFFER_BYTES`] buffer
///
/// One cell is taken by the counter, the rest hold entries.
#[allow(clippy::cast_possible_truncation)]
pub const DEFAULT_CAPACITY: u32 = ((DEFAULT_BUFFER_BYTES - CELL_SIZE as u64) / CELL_SIZE as u64) as u32;

/// File size in bytes needed for `capacity` entries plus the counter cell
#[must_use]
pub fn buffer_size(capacity: u32) -> u64 {
    CELL_SIZE as u64 + CELL_SIZE as u64 * u64::from(capacity)
}

/// Number of whole entries a file of `bytes` can hold
///
/// Returns `None` when the file is too short for the counter cell. Trailing
/// bytes that do not form a whole entry are ignored, and capacities beyond
/// `u32::MAX` are clamped since the counter cell cannot index further.
#[must_use]
pub fn capacity_for_size(bytes: u64) -> Option<u32> {
    let entries = bytes.checked_sub(CELL_SIZE as u64)? / CELL_SIZE as u64;
    Some(u32::try_from(entries).unwrap_or(u32::MAX))
}
