//! Integration tests for the resort command.

use std::path::Path;
use std::process::Command;

use dupsort_lib::bam_io::{bai_path_for, is_coordinate_sorted};
use dupsort_lib::sam::builder::{RecordBuilder, read_test_bam};
use noodles::sam::alignment::record_buf::RecordBuf;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{
    assert_coordinate_sorted, assert_same_records, assert_unplaced_last, nearly_sorted, read_at,
    two_reference_header, unplaced, write_bam,
};

fn dupsort() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dupsort"))
}

/// Reads from both references interleaved, nearly sorted within each, with
/// a few stragglers and unplaced pairs.
fn input_records() -> Vec<RecordBuf> {
    let chr1 = nearly_sorted(0, 300, 7, 5);
    let chr2 = nearly_sorted(1, 200, 11, 4);
    let mut records: Vec<RecordBuf> = Vec::new();
    let mut chr2 = chr2.into_iter();
    for (i, record) in chr1.into_iter().enumerate() {
        records.push(record);
        if i % 3 == 0 {
            records.extend(chr2.next());
        }
    }
    records.extend(chr2);
    records.push(read_at("straggler1", 0, 3));
    records.push(unplaced("u1"));
    records.push(read_at("straggler2", 1, 2));
    records.push(unplaced("u2"));
    records
}

fn write_input(dir: &Path) -> (std::path::PathBuf, Vec<RecordBuf>) {
    let records = input_records();
    let input = write_bam(dir, "input.bam", &two_reference_header(), &records);
    (input, records)
}

#[rstest]
#[case::defaults(&[])]
#[case::shared(&["--multi-output", "false"])]
#[case::narrow_window(&["--position-buffer", "5", "--base-capacity", "2", "--threads", "3"])]
fn test_resort_produces_sorted_output(#[case] extra: &[&str]) {
    let dir = TempDir::new().unwrap();
    let (input, expected) = write_input(dir.path());
    let output = dir.path().join("sorted.bam");

    let status = dupsort()
        .arg("resort")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(extra)
        .status()
        .expect("Failed to run dupsort resort");
    assert!(status.success());

    let (header, records) = read_test_bam(&output).unwrap();
    assert!(is_coordinate_sorted(&header));
    assert_coordinate_sorted(&records);
    assert_unplaced_last(&records);
    assert_same_records(&records, &expected);
    assert!(bai_path_for(&output).exists());
    assert!(!dir.path().join("sorted.shared.unsorted.bam").exists());
}

#[test]
fn test_resort_keep_interim() {
    let dir = TempDir::new().unwrap();
    let (input, _) = write_input(dir.path());
    let output = dir.path().join("sorted.bam");

    let status = dupsort()
        .arg("resort")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--keep-interim")
        .status()
        .expect("Failed to run dupsort resort");
    assert!(status.success());
    assert!(dir.path().join("sorted.part0000.sorted.bam").exists());
    assert!(dir.path().join("sorted.part0001.sorted.bam").exists());
}

#[rstest]
#[case::jitter_only(false, None)]
#[case::with_stragglers(true, Some("forwarded to shared writer: 2"))]
fn test_resort_forwards_only_stragglers(#[case] stragglers: bool, #[case] expected: Option<&str>) {
    let dir = TempDir::new().unwrap();
    let mut records = input_records();
    if !stragglers {
        records.retain(|r| !r.name().is_some_and(|n| n.starts_with(b"straggler")));
    }
    let input = write_bam(dir.path(), "input.bam", &two_reference_header(), &records);
    let output = dir.path().join("sorted.bam");

    let result = dupsort()
        .env("RUST_LOG", "info")
        .arg("resort")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--keep-interim")
        .output()
        .expect("Failed to run dupsort resort");
    assert!(result.status.success());

    let log = String::from_utf8_lossy(&result.stderr);
    let shared = dir.path().join("sorted.shared.unsorted.bam");
    match expected {
        Some(line) => {
            assert!(log.contains(line), "unexpected log output: {log}");
            assert!(shared.exists());
        }
        None => {
            assert!(!log.contains("forwarded"), "unexpected log output: {log}");
            assert!(!shared.exists());
        }
    }

    let (_, written) = read_test_bam(&output).unwrap();
    assert_coordinate_sorted(&written);
    assert_same_records(&written, &records);
}

#[test]
fn test_resort_no_output() {
    let dir = TempDir::new().unwrap();
    let (input, _) = write_input(dir.path());
    let output = dir.path().join("sorted.bam");

    let status = dupsort()
        .arg("resort")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(["--no-output", "--consensus-tag", "MI"])
        .status()
        .expect("Failed to run dupsort resort");
    assert!(status.success());
    assert!(!output.exists());
}

#[test]
fn test_resort_counts_consensus_records() {
    let dir = TempDir::new().unwrap();
    let records = vec![
        read_at("p1", 0, 10),
        RecordBuilder::mapped_read().name("c1").alignment_start(20).tag("MI", "1").build(),
    ];
    let input = write_bam(dir.path(), "input.bam", &two_reference_header(), &records);

    let result = dupsort()
        .env("RUST_LOG", "info")
        .arg("resort")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("sorted.bam"))
        .args(["--consensus-tag", "MI"])
        .output()
        .expect("Failed to run dupsort resort");
    assert!(result.status.success());
    let log = String::from_utf8_lossy(&result.stderr);
    assert!(log.contains("consensus: 1"), "unexpected log output: {log}");
}

#[test]
fn test_resort_rejects_bad_consensus_tag() {
    let dir = TempDir::new().unwrap();
    let (input, _) = write_input(dir.path());

    let result = dupsort()
        .arg("resort")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("sorted.bam"))
        .args(["--consensus-tag", "MID"])
        .output()
        .expect("Failed to run dupsort resort");
    assert!(!result.status.success());
    assert!(!dir.path().join("sorted.bam").exists());
}
