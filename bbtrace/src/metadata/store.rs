//! Shared CFG metadata store
//!
//! Many compilation units, possibly running at the same time, append their
//! records to one file. The file is JSON Lines: each record is one compact
//! JSON object followed by a newline, so readers recover every record without
//! needing a single top-level document. Appends write a whole line at the end
//! of the file while holding an exclusive lock.

use super::record::ModuleCfg;
use crate::domain::MetadataError;
use crate::lockfile::{self, LockMode};
use bbtrace_common::env::CFG_FILE;
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    lock_timeout: Option<Duration>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock_timeout: None }
    }

    /// Store at `CFG_FILE`
    ///
    /// # Errors
    /// Returns [`MetadataError::NotConfigured`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self, MetadataError> {
        std::env::var_os(CFG_FILE)
            .filter(|p| !p.is_empty())
            .map(Self::new)
            .ok_or(MetadataError::NotConfigured)
    }

    /// Fail with a lock timeout instead of waiting forever for other writers
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one compilation unit's record
    ///
    /// # Errors
    /// Returns an error naming the store if it cannot be opened, locked or
    /// written. Other units' records are left intact either way.
    pub fn append(&self, module: &ModuleCfg) -> Result<(), MetadataError> {
        let mut line = serde_json::to_string(module)?;
        line.push('\n');

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|source| MetadataError::Open { path: self.path.clone(), source })?;
        let _lock = lockfile::lock(&file, &self.path, LockMode::Exclusive, self.lock_timeout)?;

        let read_err = |source| MetadataError::Read { path: self.path.clone(), source };
        let write_err = |source| MetadataError::Write { path: self.path.clone(), source };

        let start = file.metadata().map_err(read_err)?.len();
        let mut record = Vec::with_capacity(line.len() + 1);
        if start > 0 && !ends_with_newline(&file, start).map_err(read_err)? {
            // A writer died mid-record; close its line so ours stays whole
            warn!("{} ends in a partial record; starting a new line", self.path.display());
            record.push(b'\n');
        }
        record.extend_from_slice(line.as_bytes());

        let mut handle = &file;
        if let Err(source) = handle.write_all(&record).and_then(|()| handle.flush()) {
            if let Err(e) = file.set_len(start) {
                warn!("Could not remove partial record from {}: {e}", self.path.display());
            }
            return Err(write_err(source));
        }

        debug!(
            "Appended CFG record for {} ({} functions) to {}",
            module.module_name(),
            module.functions().len(),
            self.path.display()
        );
        Ok(())
    }

    /// Read and validate every record, oldest first
    ///
    /// A store that does not exist yet holds no records.
    ///
    /// # Errors
    /// - The store cannot be opened, locked or read
    /// - A line is not a record ([`MetadataError::Malformed`] with its line number)
    /// - A record breaks the CFG invariants
    pub fn read_all(&self) -> Result<Vec<ModuleCfg>, MetadataError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(MetadataError::Open { path: self.path.clone(), source }),
        };
        let _lock = lockfile::lock(&file, &self.path, LockMode::Shared, self.lock_timeout)?;

        let mut modules = Vec::new();
        for (index, line) in BufReader::new(&file).lines().enumerate() {
            let line =
                line.map_err(|source| MetadataError::Read { path: self.path.clone(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            let module: ModuleCfg = serde_json::from_str(&line).map_err(|source| {
                MetadataError::Malformed { path: self.path.clone(), line: index + 1, source }
            })?;
            module.validate()?;
            modules.push(module);
        }
        Ok(modules)
    }

    /// Read every record that survived, skipping damaged lines
    ///
    /// Lines that are not a record, or break the CFG invariants, are logged and
    /// their numbers returned; the records around them are kept.
    ///
    /// # Errors
    /// The store cannot be opened, locked or read.
    pub fn recover(&self) -> Result<Recovered, MetadataError> {
        let mut recovered = Recovered::default();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(recovered),
            Err(source) => return Err(MetadataError::Open { path: self.path.clone(), source }),
        };
        let _lock = lockfile::lock(&file, &self.path, LockMode::Shared, self.lock_timeout)?;

        for (index, line) in BufReader::new(&file).lines().enumerate() {
            let line =
                line.map_err(|source| MetadataError::Read { path: self.path.clone(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<ModuleCfg>(&line)
                .map_err(|source| MetadataError::Malformed {
                    path: self.path.clone(),
                    line: index + 1,
                    source,
                })
                .and_then(|module| module.validate().map(|()| module));
            match parsed {
                Ok(module) => recovered.modules.push(module),
                Err(e) => {
                    warn!("Skipping line {} of {}: {e}", index + 1, self.path.display());
                    recovered.damaged_lines.push(index + 1);
                }
            }
        }
        Ok(recovered)
    }
}

/// Records read back by [`MetadataStore::recover`]
#[derive(Debug, Default)]
pub struct Recovered {
    pub modules: Vec<ModuleCfg>,
    /// 1-based line numbers that held no usable record
    pub damaged_lines: Vec<usize>,
}

fn ends_with_newline(mut file: &File, len: u64) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
