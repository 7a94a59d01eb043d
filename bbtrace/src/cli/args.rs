//! CLI argument definitions

use bbtrace_common::{instance_path, BufferError, DEFAULT_CAPACITY};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "bbtrace",
    about = "Basic-block trace collection for fuzzing and coverage",
    after_help = "\
EXAMPLES:
    bbtrace provision --instance run1        Fresh buffer at /tmp/coverage_shm.bin.run1
    bbtrace inspect --instance run1          List the recorded block IDs
    bbtrace register --module a.c --input a.json
                                             Allocate IDs for a.c and store its CFG
    bbtrace cfg                              Summarize the metadata store"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or reset a trace buffer (counter 0, zeroed entries)
    Provision {
        #[command(flatten)]
        buffer: BufferArgs,
    },
    /// Print the contents of a quiesced trace buffer
    Inspect {
        #[command(flatten)]
        buffer: BufferArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// List at most N entries (text format only)
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// Annotate entries with their function from this metadata store
        #[arg(long, value_name = "FILE")]
        cfg_file: Option<PathBuf>,
    },
    /// Allocate block IDs from the counter file and print them
    Alloc {
        #[command(flatten)]
        counter: CounterArgs,

        /// Number of IDs to allocate
        #[arg(long, default_value = "1")]
        count: u32,
    },
    /// Start block IDs from 0 again
    ResetCounter {
        #[command(flatten)]
        counter: CounterArgs,
    },
    /// Allocate IDs for a compilation unit and append its CFG record
    Register {
        /// Compilation unit name stored in the record
        #[arg(long)]
        module: String,

        /// Function manifest (JSON), `-` for stdin
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        counter: CounterArgs,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Read and validate the CFG metadata store
    Cfg {
        #[command(flatten)]
        store: StoreArgs,

        /// Print the records as JSON Lines instead of a summary
        #[arg(long)]
        json: bool,

        /// Skip damaged lines instead of failing on the first one
        #[arg(long)]
        recover: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(clap::Args)]
pub struct BufferArgs {
    /// Trace buffer file
    #[arg(long, env = "COVERAGE_SHM_FILE", default_value = "/tmp/coverage_shm.bin")]
    pub path: PathBuf,

    /// Per-run tag appended to the buffer path
    #[arg(long, env = "COVERAGE_INSTANCE")]
    pub instance: Option<String>,

    /// Entry capacity (derived from the file size when inspecting)
    #[arg(long, env = "COVERAGE_CAPACITY")]
    pub capacity: Option<u32>,
}

impl BufferArgs {
    /// Buffer path with the instance tag applied
    ///
    /// # Errors
    /// Returns an error if the tag is not a plain file-name component.
    pub fn resolve(&self) -> Result<PathBuf, BufferError> {
        instance_path(&self.path, self.instance.as_deref().filter(|t| !t.is_empty()))
    }

    #[must_use]
    pub fn capacity_or_default(&self) -> u32 {
        self.capacity.unwrap_or(DEFAULT_CAPACITY)
    }
}

#[derive(clap::Args)]
pub struct CounterArgs {
    /// Block counter file
    #[arg(long, env = "BLOCK_COUNTER_FILE")]
    pub counter_file: Option<PathBuf>,

    /// Give up on a contended lock after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub lock_timeout: Option<u64>,
}

impl CounterArgs {
    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout.map(Duration::from_millis)
    }
}

#[derive(clap::Args)]
pub struct StoreArgs {
    /// CFG metadata store
    #[arg(long, env = "CFG_FILE")]
    pub cfg_file: Option<PathBuf>,
}
