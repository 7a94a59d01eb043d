//! Block ID allocation
//!
//! - `counter`: the [`CounterService`] capability and its file-backed and
//!   in-memory implementations
//! - `allocator`: [`BlockIdAllocator`], the never-failing front end used
//!   while instrumenting

pub mod allocator;
pub mod counter;

pub use allocator::BlockIdAllocator;
pub use counter::{CounterService, FileCounter, InMemoryCounter};
