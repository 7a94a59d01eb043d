//! Structured error types for bbtrace
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Resource errors always carry the path they failed on.

use super::types::BlockId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to lock {path}: {source}")]
    Failed { path: PathBuf, source: std::io::Error },

    #[error("Timed out after {waited:?} waiting for the lock on {path}")]
    Timeout { path: PathBuf, waited: Duration },
}

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("Block counter file is not configured (set BLOCK_COUNTER_FILE)")]
    NotConfigured,

    #[error("Failed to open block counter file {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },

    #[error("Failed to read block counter file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Failed to write block counter file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("Block ID space of {counter} is exhausted")]
    Exhausted { counter: String },

    #[error(transparent)]
    Lock(#[from] LockError),
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("CFG metadata store is not configured (set CFG_FILE)")]
    NotConfigured,

    #[error("Failed to open CFG metadata store {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },

    #[error("Failed to write CFG metadata store {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("Failed to read CFG metadata store {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Malformed record at {path}:{line}: {source}")]
    Malformed { path: PathBuf, line: usize, source: serde_json::Error },

    #[error("Invalid record for function {function} in module {module}: {reason}")]
    InvalidRecord { module: String, function: String, reason: String },

    #[error("Function {0} has no blocks")]
    EmptyFunction(String),

    #[error("Block {block} appears twice in function {function}")]
    DuplicateBlock { function: String, block: BlockId },

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}
