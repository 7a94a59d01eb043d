//! Behaviour that only shows across process boundaries: several programs
//! recording into one buffer, diagnostics on stderr, and the fatal exit.
//!
//! Each case re-runs this test binary filtered to `child_entry`, which acts
//! as the instrumented program when `BBTRACE_TEST_ROLE` is set.

use bbtrace_common::{inspect_auto, BlockId, TraceBuffer};
use bbtrace_runtime::__coverage_push;
use std::collections::HashSet;
use std::path::Path;
use std::process::{Command, Output};

const ROLE: &str = "BBTRACE_TEST_ROLE";
const FIRST: &str = "BBTRACE_TEST_FIRST";
const COUNT: &str = "BBTRACE_TEST_COUNT";

#[test]
fn child_entry() {
    if std::env::var(ROLE).as_deref() != Ok("record") {
        return;
    }
    let first: u32 = std::env::var(FIRST).unwrap().parse().unwrap();
    let count: u32 = std::env::var(COUNT).unwrap().parse().unwrap();
    for id in first..first + count {
        __coverage_push(id);
    }
}

fn program(first: u32, count: u32) -> Command {
    let mut cmd = Command::new(std::env::current_exe().unwrap());
    cmd.args(["child_entry", "--exact", "--nocapture", "--test-threads=1"])
        .env(ROLE, "record")
        .env(FIRST, first.to_string())
        .env(COUNT, count.to_string())
        .env_remove("RUST_LOG")
        .env_remove("COVERAGE_SHM_FILE")
        .env_remove("COVERAGE_INSTANCE")
        .env_remove("COVERAGE_CAPACITY")
        .env_remove("COVERAGE_DEBUG");
    cmd
}

fn run_programs(path: &Path, programs: u32, per_program: u32) {
    let children: Vec<_> = (0..programs)
        .map(|p| {
            program(p * 10_000, per_program)
                .env("COVERAGE_SHM_FILE", path)
                .stdout(std::process::Stdio::null())
                .spawn()
                .unwrap()
        })
        .collect();
    for child in children {
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    }
}

fn expected_ids(programs: u32, per_program: u32) -> HashSet<BlockId> {
    (0..programs).flat_map(|p| (p * 10_000..p * 10_000 + per_program).map(BlockId)).collect()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_processes_share_one_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.bin");
    TraceBuffer::provision(&path, 1_000).unwrap();

    run_programs(&path, 4, 200);

    let snapshot = inspect_auto(&path).unwrap();
    assert_eq!(snapshot.recorded, 800);
    assert_eq!(snapshot.entries.len(), 800);
    let stored: HashSet<BlockId> = snapshot.entries.iter().copied().collect();
    assert_eq!(stored.len(), 800, "a slot was written twice");
    assert_eq!(stored, expected_ids(4, 200));
}

#[test]
fn test_processes_past_capacity_keep_counting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.bin");
    TraceBuffer::provision(&path, 100).unwrap();

    run_programs(&path, 4, 50);

    let snapshot = inspect_auto(&path).unwrap();
    assert_eq!(snapshot.recorded, 200);
    assert_eq!(snapshot.entries.len(), 100);
    assert_eq!(snapshot.dropped(), 100);

    let stored: HashSet<BlockId> = snapshot.entries.iter().copied().collect();
    assert_eq!(stored.len(), 100);
    assert!(stored.is_subset(&expected_ids(4, 50)));
}

#[test]
fn test_debug_toggle_logs_mapping_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("debug.bin");

    let output = program(7, 2)
        .env("COVERAGE_SHM_FILE", &path)
        .env("COVERAGE_CAPACITY", "16")
        .env("COVERAGE_DEBUG", "1")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let log = stderr(&output);
    assert!(log.contains("mapped"), "{log}");
    assert!(log.contains("record block 7 (stored)"), "{log}");
    assert!(log.contains("record block 8 (stored)"), "{log}");
}

#[test]
fn test_quiet_without_debug_toggle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quiet.bin");

    let output = program(1, 3).env("COVERAGE_SHM_FILE", &path).output().unwrap();
    assert!(output.status.success());
    assert!(!stderr(&output).contains("record block"));
    assert_eq!(inspect_auto(&path).unwrap().recorded, 3);
}

#[test]
fn test_bad_instance_tag_exits_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coverage.bin");

    let output = program(1, 1)
        .env("COVERAGE_SHM_FILE", &path)
        .env("COVERAGE_INSTANCE", "../x")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let message = stderr(&output);
    assert!(message.contains("bbtrace-runtime:"), "{message}");
    assert!(message.contains("../x"), "{message}");
    assert!(!dir.path().join("x").exists());
}

#[test]
fn test_unusable_buffer_path_exits_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("trace.bin");

    let output = program(1, 1).env("COVERAGE_SHM_FILE", &path).output().unwrap();
    assert_eq!(output.status.code(), Some(1));

    let message = stderr(&output);
    assert!(message.contains("bbtrace-runtime:"), "{message}");
    assert!(message.contains(&path.display().to_string()), "{message}");
}
