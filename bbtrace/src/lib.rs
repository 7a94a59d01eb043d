//! # bbtrace - Basic-Block Trace Collection
//!
//! Build-time and inspection side of the block tracer. An instrumenter gives
//! every basic block of the program under test a unique 32-bit ID and
//! inserts a call to `__coverage_push(id)` at the top of the block. At run
//! time `bbtrace-runtime` appends each ID to a memory-mapped trace buffer
//! that a fuzzer or analysis tool reads once the run has finished.
//!
//! ## Architecture Overview
//!
//! ```text
//!  build time                                   run time
//! ┌──────────────────────────┐        ┌──────────────────────────────┐
//! │ instrumenter (per unit)  │        │ instrumented program         │
//! │  ModuleRecorder ─────────┼─ IDs ─▶│  __coverage_push(id)         │
//! │   │          │           │        │   │  (bbtrace-runtime)       │
//! │   ▼          ▼           │        │   ▼                          │
//! │ counter    metadata      │        │ trace buffer (mmap, shared)  │
//! │ file       store (JSONL) │        └───┬──────────────────────────┘
//! └──────────────────────────┘            │
//!                                         ▼
//!                            bbtrace inspect / fuzzer / coverage tools
//! ```
//!
//! ## Module Structure
//!
//! - [`allocation`]: cross-process unique block IDs
//!   - `counter`: the locked counter file and an in-memory counter for tests
//!   - `allocator`: never-failing front end that degrades to the sentinel ID
//! - [`metadata`]: per-function CFG records and the shared JSON Lines store
//! - [`inspection`]: text and JSON rendering of trace buffers and records
//! - [`lockfile`]: advisory whole-file locks with an optional bounded wait
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: block IDs, terminator kinds, and error types
//!
//! The buffer layout and its memory-mapped access live in `bbtrace-common`,
//! shared with the runtime.
//!
//! ## Typical Usage
//!
//! ```bash
//! export BLOCK_COUNTER_FILE=/tmp/bb.counter CFG_FILE=/tmp/bb.cfg.jsonl
//! bbtrace reset-counter
//! bbtrace register --module main.c --input main.blocks.json
//!
//! bbtrace provision --instance run1
//! COVERAGE_INSTANCE=run1 ./instrumented-target
//! bbtrace inspect --instance run1 --cfg-file /tmp/bb.cfg.jsonl
//! ```

pub mod allocation;
pub mod cli;
pub mod domain;
pub mod inspection;
pub mod lockfile;
pub mod metadata;
