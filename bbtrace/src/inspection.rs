//! Trace buffer inspection output
//!
//! Reads a quiesced trace buffer and renders it for people (text) or tools
//! (JSON). The text form keeps the layout of the historical reader so
//! existing scripts that scrape it keep working.

use crate::metadata::{BlockIndex, ModuleCfg};
use bbtrace_common::{inspect, inspect_auto, BlockId, BufferError, TraceSnapshot};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::Path;

/// Snapshot a buffer, with an explicit capacity or one derived from its size
///
/// # Errors
/// See [`bbtrace_common::inspect`].
pub fn snapshot(path: &Path, capacity: Option<u32>) -> Result<TraceSnapshot, BufferError> {
    match capacity {
        Some(capacity) => inspect(path, capacity),
        None => inspect_auto(path),
    }
}

/// Aggregate view of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceSummary {
    pub recorded: u32,
    pub stored: usize,
    pub dropped: u32,
    pub distinct_blocks: usize,
}

impl TraceSummary {
    #[must_use]
    pub fn of(snapshot: &TraceSnapshot) -> Self {
        let distinct: HashSet<BlockId> = snapshot.entries.iter().copied().collect();
        Self {
            recorded: snapshot.recorded,
            stored: snapshot.entries.len(),
            dropped: snapshot.dropped(),
            distinct_blocks: distinct.len(),
        }
    }
}

/// Write the human-readable listing
///
/// At most `limit` entries are listed; the summary always covers all of them.
/// With an index, each entry is annotated with its owning function.
///
/// # Errors
/// Returns any error from `out`.
pub fn write_text<W: Write>(
    mut out: W,
    snapshot: &TraceSnapshot,
    limit: Option<usize>,
    index: Option<&BlockIndex>,
) -> io::Result<()> {
    writeln!(out, "Collected Trace Length: {}", snapshot.recorded)?;

    let shown = limit.unwrap_or(usize::MAX).min(snapshot.entries.len());
    for (i, id) in snapshot.entries.iter().take(shown).enumerate() {
        match index.and_then(|idx| idx.locate(*id)) {
            Some(loc) => writeln!(out, "Block {i} ID: {id} ({}::{})", loc.module, loc.function)?,
            None => writeln!(out, "Block {i} ID: {id}")?,
        }
    }
    if shown < snapshot.entries.len() {
        writeln!(out, "... {} more entries", snapshot.entries.len() - shown)?;
    }

    let summary = TraceSummary::of(snapshot);
    writeln!(out, "Distinct blocks: {}", summary.distinct_blocks)?;
    if snapshot.is_truncated() {
        writeln!(
            out,
            "warning: buffer full at {} entries, {} records dropped",
            snapshot.capacity, summary.dropped
        )?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    snapshot: &'a TraceSnapshot,
    truncated: bool,
    summary: TraceSummary,
}

/// Write the snapshot and its summary as one JSON document
///
/// # Errors
/// Returns any serialization or I/O error.
pub fn write_json<W: Write>(mut out: W, snapshot: &TraceSnapshot) -> serde_json::Result<()> {
    let report =
        JsonReport { snapshot, truncated: snapshot.is_truncated(), summary: TraceSummary::of(snapshot) };
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out).map_err(serde_json::Error::io)
}

/// One line per compilation unit, then totals
///
/// # Errors
/// Returns any error from `out`.
pub fn write_cfg_summary<W: Write>(mut out: W, modules: &[ModuleCfg]) -> io::Result<()> {
    let (mut functions, mut blocks, mut exits) = (0, 0, 0);
    for module in modules {
        writeln!(
            out,
            "{}: {} functions, {} blocks, {} exits",
            module.module_name(),
            module.functions().len(),
            module.block_count(),
            module.exit_count()
        )?;
        functions += module.functions().len();
        blocks += module.block_count();
        exits += module.exit_count();
    }
    writeln!(out, "Total: {} modules, {functions} functions, {blocks} blocks, {exits} exits", modules.len())?;

    let collisions = BlockIndex::build(modules).collisions();
    if collisions > 0 {
        writeln!(out, "warning: {collisions} block IDs are claimed more than once")?;
    }
    Ok(())
}

/// Write the records back as JSON Lines
///
/// # Errors
/// Returns any serialization or I/O error.
pub fn write_cfg_json<W: Write>(mut out: W, modules: &[ModuleCfg]) -> serde_json::Result<()> {
    for module in modules {
        serde_json::to_writer(&mut out, module)?;
        writeln!(out).map_err(serde_json::Error::io)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{BlockIdAllocator, InMemoryCounter};
    use crate::domain::Terminator::{Other, Return};
    use crate::metadata::ModuleRecorder;

    fn sample(recorded: u32, capacity: u32, ids: &[u32]) -> TraceSnapshot {
        TraceSnapshot { recorded, capacity, entries: ids.iter().copied().map(BlockId).collect() }
    }

    fn render(snapshot: &TraceSnapshot, limit: Option<usize>, index: Option<&BlockIndex>) -> String {
        let mut out = Vec::new();
        write_text(&mut out, snapshot, limit, index).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_listing_matches_reader_layout() {
        let text = render(&sample(3, 8, &[4, 5, 4]), None, None);
        assert_eq!(
            text,
            "Collected Trace Length: 3\nBlock 0 ID: 4\nBlock 1 ID: 5\nBlock 2 ID: 4\nDistinct blocks: 2\n"
        );
    }

    #[test]
    fn test_text_listing_reports_truncation() {
        let text = render(&sample(5, 2, &[1, 2]), None, None);
        assert!(text.contains("Collected Trace Length: 5"));
        assert!(text.contains("3 records dropped"));
    }

    #[test]
    fn test_text_listing_limit() {
        let text = render(&sample(4, 4, &[1, 2, 3, 4]), Some(1), None);
        assert!(text.contains("Block 0 ID: 1"));
        assert!(!text.contains("Block 1 ID"));
        assert!(text.contains("... 3 more entries"));
    }

    #[test]
    fn test_text_listing_annotates_with_index() {
        let allocator = BlockIdAllocator::new(InMemoryCounter::new());
        let mut recorder = ModuleRecorder::new("a.c", &allocator);
        recorder.record_function("main", [Other, Return]);
        let index = BlockIndex::build(&[recorder.finish()]);

        let text = render(&sample(2, 4, &[1, 7]), None, Some(&index));
        assert!(text.contains("Block 0 ID: 1 (a.c::main)"));
        assert!(text.contains("Block 1 ID: 7\n"));
    }

    #[test]
    fn test_json_report() {
        let mut out = Vec::new();
        write_json(&mut out, &sample(3, 2, &[9, 9])).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["recorded"], 3);
        assert_eq!(json["capacity"], 2);
        assert_eq!(json["entries"], serde_json::json!([9, 9]));
        assert_eq!(json["truncated"], true);
        assert_eq!(json["summary"]["dropped"], 1);
        assert_eq!(json["summary"]["distinct_blocks"], 1);
    }

    #[test]
    fn test_cfg_summary() {
        let allocator = BlockIdAllocator::new(InMemoryCounter::new());
        let mut a = ModuleRecorder::new("a.c", &allocator);
        a.record_function("main", [Other, Other, Return]);
        a.record_function("helper", [Return]);
        let mut b = ModuleRecorder::new("b.c", &allocator);
        b.record_function("util", [Other, Return]);

        let mut out = Vec::new();
        write_cfg_summary(&mut out, &[a.finish(), b.finish()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "a.c: 2 functions, 4 blocks, 2 exits\n\
             b.c: 1 functions, 2 blocks, 1 exits\n\
             Total: 2 modules, 3 functions, 6 blocks, 3 exits\n"
        );
    }

    #[test]
    fn test_cfg_json_lines() {
        let allocator = BlockIdAllocator::new(InMemoryCounter::new());
        let mut recorder = ModuleRecorder::new("a.c", &allocator);
        recorder.record_function("main", [Return]);
        let module = recorder.finish();

        let mut out = Vec::new();
        write_cfg_json(&mut out, &[module.clone(), module]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["moduleName"], "a.c");
    }
}
