//! Runtime configuration resolved from the environment
//!
//! Instrumented programs own their command line, so the runtime reads
//! everything from environment variables (see [`bbtrace_common::env`]).

use bbtrace_common::env::{
    flag_enabled, COVERAGE_CAPACITY, COVERAGE_DEBUG, COVERAGE_INSTANCE, COVERAGE_SHM_FILE,
    DEFAULT_SHM_FILE,
};
use bbtrace_common::{instance_path, BufferError, DEFAULT_CAPACITY};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Cannot resolve trace buffer path from COVERAGE_SHM_FILE/COVERAGE_INSTANCE: {0}")]
    PathResolution(#[source] BufferError),

    #[error("Invalid COVERAGE_CAPACITY value {0:?}: expected an entry count")]
    InvalidCapacity(String),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Where and how the runtime records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Backing file of this instance's buffer (base path plus instance tag)
    pub buffer_path: PathBuf,
    /// Capacity used only if the runtime has to create the buffer itself
    pub capacity: u32,
    /// Emit mapping and record events to stderr
    pub verbose: bool,
}

impl RuntimeConfig {
    /// Resolve from the process environment
    ///
    /// # Errors
    /// See [`RuntimeConfig::from_lookup`].
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` in place of the environment
    ///
    /// # Errors
    /// - `COVERAGE_SHM_FILE` is set but empty, or `COVERAGE_INSTANCE` is not a
    ///   usable file name suffix
    /// - `COVERAGE_CAPACITY` is not a `u32`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RuntimeError> {
        let base = lookup(COVERAGE_SHM_FILE).unwrap_or_else(|| DEFAULT_SHM_FILE.to_string());
        let tag = lookup(COVERAGE_INSTANCE);
        let buffer_path = instance_path(Path::new(&base), tag.as_deref().map(str::trim))
            .map_err(RuntimeError::PathResolution)?;

        let capacity = match lookup(COVERAGE_CAPACITY) {
            None => DEFAULT_CAPACITY,
            Some(value) => {
                value.trim().parse().map_err(|_| RuntimeError::InvalidCapacity(value.clone()))?
            }
        };

        let verbose = flag_enabled(lookup(COVERAGE_DEBUG).as_deref());

        Ok(Self { buffer_path, capacity, verbose })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> Result<RuntimeConfig, RuntimeError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        RuntimeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve(&[]).unwrap();
        assert_eq!(config.buffer_path, PathBuf::from(DEFAULT_SHM_FILE));
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert!(!config.verbose);
    }

    #[test]
    fn test_instance_tag_selects_separate_file() {
        let config = resolve(&[
            (COVERAGE_SHM_FILE, "/dev/shm/trace.bin"),
            (COVERAGE_INSTANCE, "worker-2"),
            (COVERAGE_DEBUG, "1"),
        ])
        .unwrap();
        assert_eq!(config.buffer_path, PathBuf::from("/dev/shm/trace.bin.worker-2"));
        assert!(config.verbose);
    }

    #[test]
    fn test_capacity_override() {
        let config = resolve(&[(COVERAGE_CAPACITY, " 4096 ")]).unwrap();
        assert_eq!(config.capacity, 4096);
    }

    #[test]
    fn test_invalid_capacity_is_reported() {
        let err = resolve(&[(COVERAGE_CAPACITY, "lots")]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCapacity(_)));
        assert!(err.to_string().contains(COVERAGE_CAPACITY));
    }

    #[test]
    fn test_empty_base_path_is_fatal() {
        let err = resolve(&[(COVERAGE_SHM_FILE, "")]).unwrap_err();
        assert!(matches!(err, RuntimeError::PathResolution(BufferError::EmptyPath)));
    }

    #[test]
    fn test_traversing_instance_tag_is_fatal() {
        let err = resolve(&[(COVERAGE_INSTANCE, "../../etc/passwd")]).unwrap_err();
        assert!(matches!(err, RuntimeError::PathResolution(BufferError::InvalidInstanceTag(_))));
    }
}
