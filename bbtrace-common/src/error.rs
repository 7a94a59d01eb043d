//! Trace buffer errors
//!
//! Every variant names the file it failed on so fatal diagnostics in the
//! runtime can point at the resource.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Failed to open trace buffer {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },

    #[error("Failed to size trace buffer {path} to {bytes} bytes: {source}")]
    Resize { path: PathBuf, bytes: u64, source: std::io::Error },

    #[error("Failed to map trace buffer {path}: {source}")]
    Map { path: PathBuf, source: std::io::Error },

    #[error("Failed to flush trace buffer {path}: {source}")]
    Flush { path: PathBuf, source: std::io::Error },

    #[error("Trace buffer {path} is {actual} bytes, too short for a counter cell")]
    Truncated { path: PathBuf, actual: u64 },

    #[error("Trace buffer {path} is {actual} bytes, expected at least {expected} for the requested capacity")]
    TooSmall { path: PathBuf, expected: u64, actual: u64 },

    #[error("Trace buffer path is empty")]
    EmptyPath,

    #[error("Invalid instance tag {0:?}: must not contain path separators, '..', or control characters")]
    InvalidInstanceTag(String),
}
