//! # bbtrace - Main Entry Point
//!
//! Operator commands around the block tracer:
//! - **Buffers** (`provision`, `inspect`): create, reset and read trace buffers
//! - **Counter** (`alloc`, `reset-counter`): drive the block ID counter file
//! - **Metadata** (`register`, `cfg`): feed and read the CFG metadata store

use anyhow::{Context, Result};
use bbtrace::allocation::{BlockIdAllocator, CounterService, FileCounter};
use bbtrace::cli::{Args, BufferArgs, Command, CounterArgs, Format, StoreArgs};
use bbtrace::inspection;
use bbtrace::metadata::{register_module, BlockIndex, MetadataStore, ModuleManifest};
use bbtrace_common::TraceBuffer;
use clap::Parser;
use log::{error, info, warn};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("missing required argument") || msg.contains("invalid instance tag") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Provision { buffer } => provision(&buffer),
        Command::Inspect { buffer, format, limit, cfg_file } => {
            inspect(&buffer, format, limit, cfg_file.as_deref())
        }
        Command::Alloc { counter, count } => alloc(&counter, count),
        Command::ResetCounter { counter } => reset_counter(&counter),
        Command::Register { module, input, counter, store } => {
            register(&module, &input, &counter, &store)
        }
        Command::Cfg { store, json, recover } => cfg(&store, json, recover),
    }
}

fn provision(buffer: &BufferArgs) -> Result<()> {
    let path = buffer.resolve()?;
    let capacity = buffer.capacity_or_default();
    TraceBuffer::provision(&path, capacity)?;
    info!("Provisioned {} for {capacity} entries", path.display());
    println!("{}", path.display());
    Ok(())
}

fn inspect(
    buffer: &BufferArgs,
    format: Format,
    limit: Option<usize>,
    cfg_file: Option<&Path>,
) -> Result<()> {
    let path = buffer.resolve()?;
    let snapshot = inspection::snapshot(&path, buffer.capacity)?;

    let mut out = BufWriter::new(io::stdout().lock());
    match format {
        Format::Json => {
            inspection::write_json(&mut out, &snapshot).context("Failed to write report")?;
        }
        Format::Text => {
            let index = cfg_file
                .map(|p| MetadataStore::new(p).recover().map(|r| BlockIndex::build(&r.modules)))
                .transpose()?;
            inspection::write_text(&mut out, &snapshot, limit, index.as_ref())
                .context("Failed to write report")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn counter_file(counter: &CounterArgs) -> Result<FileCounter> {
    let path = counter.counter_file.clone().filter(|p| !p.as_os_str().is_empty()).context(
        "Missing required argument: --counter-file or BLOCK_COUNTER_FILE",
    )?;
    let file = FileCounter::new(path);
    Ok(match counter.lock_timeout() {
        Some(timeout) => file.with_lock_timeout(timeout),
        None => file,
    })
}

fn alloc(counter: &CounterArgs, count: u32) -> Result<()> {
    let counter = counter_file(counter)?;
    let mut out = BufWriter::new(io::stdout().lock());
    for _ in 0..count {
        let id = counter.allocate()?;
        writeln!(out, "{id}")?;
    }
    out.flush()?;
    Ok(())
}

fn reset_counter(counter: &CounterArgs) -> Result<()> {
    let counter = counter_file(counter)?;
    counter.reset()?;
    info!("Reset {}", counter.path().display());
    Ok(())
}

fn metadata_store(store: &StoreArgs) -> Result<MetadataStore> {
    store
        .cfg_file
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .map(MetadataStore::new)
        .context("Missing required argument: --cfg-file or CFG_FILE")
}

fn read_manifest(input: &Path) -> Result<ModuleManifest> {
    let manifest = if input.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("Failed to read manifest from stdin")?;
        serde_json::from_str(&text)
    } else {
        let file = File::open(input)
            .with_context(|| format!("Failed to open manifest {}", input.display()))?;
        serde_json::from_reader(BufReader::new(file))
    };
    manifest.with_context(|| format!("Invalid manifest {}", input.display()))
}

fn register(module: &str, input: &Path, counter: &CounterArgs, store: &StoreArgs) -> Result<()> {
    let store = metadata_store(store)?;
    let manifest = read_manifest(input)?;

    // Instrumenters keep going without a counter; so does the bridge
    let allocator = match counter_file(counter) {
        Ok(file) => BlockIdAllocator::new(file),
        Err(e) => {
            error!("{e}");
            BlockIdAllocator::degraded()
        }
    };

    let assignment = register_module(module, &manifest, &allocator, &store)?;
    info!(
        "Registered {module}: {} functions into {}",
        assignment.functions.len(),
        store.path().display()
    );

    let mut out = BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut out, &assignment)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn cfg(store: &StoreArgs, json: bool, recover: bool) -> Result<()> {
    let store = metadata_store(store)?;
    let modules = if recover {
        let recovered = store.recover()?;
        if !recovered.damaged_lines.is_empty() {
            warn!(
                "Skipped damaged lines {:?} of {}",
                recovered.damaged_lines,
                store.path().display()
            );
        }
        recovered.modules
    } else {
        store.read_all()?
    };
    let mut out = BufWriter::new(io::stdout().lock());
    if json {
        inspection::write_cfg_json(&mut out, &modules)?;
    } else {
        inspection::write_cfg_summary(&mut out, &modules)?;
    }
    out.flush()?;
    Ok(())
}
