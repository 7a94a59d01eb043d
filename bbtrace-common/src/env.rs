//! Environment variables shared by the runtime and the tooling
//!
//! Instrumented programs cannot take command-line flags meant for the tracer,
//! so every knob is passed through the environment. The CLI accepts the same
//! variables as fallbacks for its flags.

use crate::error::BufferError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Path of the cross-process block ID counter file
pub const BLOCK_COUNTER_FILE: &str = "BLOCK_COUNTER_FILE";

/// Path of the CFG metadata store
pub const CFG_FILE: &str = "CFG_FILE";

/// Base path of the trace buffer backing file
pub const COVERAGE_SHM_FILE: &str = "COVERAGE_SHM_FILE";

/// Optional tag giving each traced instance its own buffer
pub const COVERAGE_INSTANCE: &str = "COVERAGE_INSTANCE";

/// Entry capacity used when the runtime has to create the buffer itself
pub const COVERAGE_CAPACITY: &str = "COVERAGE_CAPACITY";

/// Enables diagnostic output from the runtime when set to a truthy value
pub const COVERAGE_DEBUG: &str = "COVERAGE_DEBUG";

/// Trace buffer path used when `COVERAGE_SHM_FILE` is unset
pub const DEFAULT_SHM_FILE: &str = "/tmp/coverage_shm.bin";

/// Interpret an environment flag value
///
/// Unset, empty, `0`, `false`, `no` and `off` are all "disabled".
#[must_use]
pub fn flag_enabled(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"),
    }
}

/// Check that an instance tag can be used as a file name suffix
///
/// # Errors
/// Returns [`BufferError::InvalidInstanceTag`] if the tag could escape the
/// base path's directory or contains control characters.
pub fn validate_instance_tag(tag: &str) -> Result<(), BufferError> {
    let bad = tag.contains('/')
        || tag.contains('\\')
        || tag.contains("..")
        || tag.chars().any(char::is_control);
    if bad {
        return Err(BufferError::InvalidInstanceTag(tag.to_string()));
    }
    Ok(())
}

/// Resolve the backing file of one traced instance
///
/// With a tag the file is `<base>.<tag>`, otherwise the base path itself. An
/// empty tag counts as no tag.
///
/// # Errors
/// - The base path is empty
/// - The tag is rejected by [`validate_instance_tag`]
pub fn instance_path(base: &Path, tag: Option<&str>) -> Result<PathBuf, BufferError> {
    if base.as_os_str().is_empty() {
        return Err(BufferError::EmptyPath);
    }

    match tag.filter(|t| !t.is_empty()) {
        None => Ok(base.to_path_buf()),
        Some(tag) => {
            validate_instance_tag(tag)?;
            let mut name = OsString::from(base.as_os_str());
            name.push(".");
            name.push(tag);
            Ok(PathBuf::from(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_path_without_tag() {
        let path = instance_path(Path::new("/tmp/coverage_shm.bin"), None).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/coverage_shm.bin"));

        let path = instance_path(Path::new("/tmp/coverage_shm.bin"), Some("")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/coverage_shm.bin"));
    }

    #[test]
    fn test_instance_path_with_tag() {
        let path = instance_path(Path::new("/tmp/coverage_shm.bin"), Some("fuzzer03")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/coverage_shm.bin.fuzzer03"));
    }

    #[test]
    fn test_instance_tag_cannot_escape_directory() {
        let base = Path::new("/tmp/coverage_shm.bin");
        assert!(instance_path(base, Some("../etc")).is_err());
        assert!(instance_path(base, Some("a/b")).is_err());
        assert!(instance_path(base, Some("a\nb")).is_err());
    }

    #[test]
    fn test_empty_base_path_rejected() {
        let err = instance_path(Path::new(""), Some("x")).unwrap_err();
        assert!(matches!(err, BufferError::EmptyPath));
    }

    #[test]
    fn test_flag_enabled() {
        assert!(!flag_enabled(None));
        assert!(!flag_enabled(Some("")));
        assert!(!flag_enabled(Some("0")));
        assert!(!flag_enabled(Some("Off")));
        assert!(flag_enabled(Some("1")));
        assert!(flag_enabled(Some("yes")));
    }
}
