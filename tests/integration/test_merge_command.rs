//! Integration tests for the merge command.

use std::path::PathBuf;
use std::process::Command;

use dupsort_lib::bam_io::{bai_path_for, coordinate_sorted_header, is_coordinate_sorted};
use dupsort_lib::sam::builder::read_test_bam;
use tempfile::TempDir;

use crate::helpers::{
    assert_coordinate_sorted, read_at, two_reference_header, unplaced, write_bam,
};

fn dupsort() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dupsort"))
}

fn sorted_inputs(dir: &TempDir) -> Vec<PathBuf> {
    let header = coordinate_sorted_header(&two_reference_header()).unwrap();
    vec![
        write_bam(dir.path(), "a.bam", &header, &[read_at("a1", 0, 100), read_at("a2", 0, 500)]),
        write_bam(dir.path(), "b.bam", &header, &[read_at("b1", 0, 150), read_at("b2", 0, 900)]),
        write_bam(dir.path(), "c.bam", &header, &[read_at("c1", 1, 50), unplaced("c2")]),
    ]
}

#[test]
fn test_merge_writes_sorted_indexed_output() {
    let dir = TempDir::new().unwrap();
    let inputs = sorted_inputs(&dir);
    let output = dir.path().join("merged.bam");

    let status = dupsort()
        .arg("merge")
        .arg("-i")
        .args(&inputs)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("Failed to run dupsort merge");
    assert!(status.success());

    let (header, records) = read_test_bam(&output).unwrap();
    assert!(is_coordinate_sorted(&header));
    assert_coordinate_sorted(&records);
    let names: Vec<String> = records.iter().map(|r| r.name().unwrap().to_string()).collect();
    assert_eq!(names, vec!["a1", "b1", "a2", "b2", "c1", "c2"]);
    assert!(bai_path_for(&output).exists());
}

#[test]
fn test_merge_no_index() {
    let dir = TempDir::new().unwrap();
    let inputs = sorted_inputs(&dir);
    let output = dir.path().join("merged.bam");

    let status = dupsort()
        .args(["merge", "--no-index", "--threads", "2", "-o"])
        .arg(&output)
        .arg("-i")
        .args(&inputs)
        .status()
        .expect("Failed to run dupsort merge");
    assert!(status.success());
    assert!(output.exists());
    assert!(!bai_path_for(&output).exists());
}

#[test]
fn test_merge_rejects_unsorted_input() {
    let dir = TempDir::new().unwrap();
    let header = two_reference_header();
    let unsorted =
        write_bam(dir.path(), "u.bam", &header, &[read_at("x", 0, 900), read_at("y", 0, 100)]);
    let output = dir.path().join("merged.bam");

    let result = dupsort()
        .arg("merge")
        .arg("-i")
        .arg(&unsorted)
        .arg("-o")
        .arg(&output)
        .output()
        .expect("Failed to run dupsort merge");
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("not coordinate sorted"));
}

#[test]
fn test_merge_missing_input() {
    let dir = TempDir::new().unwrap();
    let status = dupsort()
        .arg("merge")
        .arg("-i")
        .arg(dir.path().join("missing.bam"))
        .arg("-o")
        .arg(dir.path().join("out.bam"))
        .output()
        .expect("Failed to run dupsort merge");
    assert!(!status.status.success());
}
