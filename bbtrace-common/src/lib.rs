//! # Shared Data Structures (Instrumented Program ↔ Tooling)
//!
//! Defines the contract shared between the runtime linked into instrumented
//! programs and the offline tooling that provisions and reads trace buffers.
//! Anything that changes here changes the on-disk format, so both sides must
//! be rebuilt together.
//!
//! ## Trace Buffer Layout
//!
//! ```text
//! offset 0            4            8                 4 + 4 × capacity
//!        ┌────────────┬────────────┬─────┬────────────┐
//!        │  counter   │  entry[0]  │ ... │ entry[C-1] │
//!        └────────────┴────────────┴─────┴────────────┘
//! ```
//!
//! All cells are native-endian `u32`. The counter is the number of attempted
//! records and keeps counting past capacity, so `counter > capacity` means the
//! trace was truncated.
//!
//! ## Key Types
//!
//! - [`BlockId`] - Identity of one instrumented basic block
//! - [`TraceBuffer`] - Owned read-write mapping of a trace buffer file
//! - [`TraceSnapshot`] - Point-in-time copy of a buffer's contents

pub mod buffer;
pub mod env;
pub mod error;
pub mod layout;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use buffer::{inspect, inspect_auto, TraceBuffer, TraceSnapshot};
pub use env::{instance_path, validate_instance_tag};
pub use error::BufferError;
pub use layout::{buffer_size, capacity_for_size, DEFAULT_CAPACITY};

/// Identity of one instrumented basic block
///
/// Allocated once per block by the counter service and embedded as the
/// argument of the runtime call at the block's entry. Only meaningful together
/// with the CFG metadata store it was allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Value handed out when the counter service is unavailable
    ///
    /// Uniqueness is not guaranteed for blocks that received it.
    pub const SENTINEL: BlockId = BlockId(0);

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlockId {
    fn from(id: u32) -> Self {
        BlockId(id)
    }
}

impl From<BlockId> for u32 {
    fn from(id: BlockId) -> Self {
        id.0
    }
}
