//! # In-Program Trace Runtime
//!
//! Linked into instrumented programs. The instrumenter inserts a call to
//! [`__coverage_push`] at the entry of every basic block, passing the block's
//! ID; each call appends that ID to the shared trace buffer.
//!
//! ## Lifecycle
//!
//! The first call in a process resolves [`RuntimeConfig`] from the
//! environment, opens (or creates) the instance's buffer file and maps it
//! shared. Later calls reuse the mapping. The mapping lives until the process
//! exits.
//!
//! ## Environment
//!
//! - `COVERAGE_SHM_FILE` - Base path of the buffer (default `/tmp/coverage_shm.bin`)
//! - `COVERAGE_INSTANCE` - Instance tag, appended as `<base>.<tag>`
//! - `COVERAGE_CAPACITY` - Entries to allocate if the buffer does not exist yet
//! - `COVERAGE_DEBUG` - Log mapping and record events to stderr
//!
//! ## Failure Policy
//!
//! A program that cannot record coverage must not keep running as if it
//! could: any configuration or mapping error prints a diagnostic naming the
//! buffer path and exits with status 1.

pub mod config;

pub use config::{RuntimeConfig, RuntimeError};

use bbtrace_common::{BlockId, TraceBuffer};
use log::{debug, trace};
use std::sync::OnceLock;

/// Exit status used when tracing cannot be set up
const EXIT_RUNTIME_FAILURE: i32 = 1;

/// A mapped buffer plus the diagnostics toggle
#[derive(Debug)]
pub struct Runtime {
    buffer: TraceBuffer,
    verbose: bool,
}

impl Runtime {
    /// Open the buffer described by `config`
    ///
    /// # Errors
    /// Returns an error naming the buffer path if it cannot be opened or mapped.
    pub fn init(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let buffer = TraceBuffer::open(&config.buffer_path, config.capacity)?;
        if config.verbose {
            debug!(
                "pid {} mapped {} ({} entries, {} already recorded)",
                std::process::id(),
                buffer.path().display(),
                buffer.capacity(),
                buffer.recorded()
            );
        }
        Ok(Self { buffer, verbose: config.verbose })
    }

    /// Append one visit
    #[inline]
    pub fn record(&self, id: BlockId) {
        let stored = self.buffer.record(id);
        if self.verbose {
            trace!("record block {id} ({})", if stored { "stored" } else { "dropped, buffer full" });
        }
    }

    #[must_use]
    pub fn buffer(&self) -> &TraceBuffer {
        &self.buffer
    }

    /// Flush and unmap
    ///
    /// # Errors
    /// Returns an error naming the buffer path if the final flush fails.
    pub fn shutdown(self) -> Result<(), RuntimeError> {
        self.buffer.close().map_err(RuntimeError::from)
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Filter used when `COVERAGE_DEBUG` is set and `RUST_LOG` is not: mapping
/// events are `debug`, per-record events are `trace`
const DIAGNOSTICS_FILTER: &str = "debug,bbtrace_runtime=trace";

fn init_diagnostics() {
    // A host program may already own the global logger; keep it if so.
    let env = env_logger::Env::default().default_filter_or(DIAGNOSTICS_FILTER);
    let _ = env_logger::Builder::from_env(env).target(env_logger::Target::Stderr).try_init();
}

fn fatal(err: &RuntimeError) -> ! {
    eprintln!("bbtrace-runtime: {err}");
    std::process::exit(EXIT_RUNTIME_FAILURE)
}

fn init_or_exit() -> Runtime {
    let config = RuntimeConfig::from_env().unwrap_or_else(|e| fatal(&e));
    if config.verbose {
        init_diagnostics();
    }
    Runtime::init(&config).unwrap_or_else(|e| fatal(&e))
}

/// The process-wide runtime, initialized on first use
pub fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(init_or_exit)
}

/// Record a visit from Rust code
#[inline]
pub fn record(id: BlockId) {
    runtime().record(id);
}

/// Record a visit to `block_id`
///
/// Inserted by the instrumenter at the entry of every basic block.
#[allow(unsafe_code)]
#[no_mangle]
pub extern "C" fn __coverage_push(block_id: u32) {
    record(BlockId(block_id));
}
