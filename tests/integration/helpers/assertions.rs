//! Custom assertion helpers for integration tests.

#![allow(dead_code)]

use dupsort_lib::sort::keys::{CoordinateKey, is_coordinate_sorted};
use noodles::sam::alignment::record_buf::RecordBuf;

/// Record names, sorted, for comparing record sets regardless of order.
pub fn sorted_names(records: &[RecordBuf]) -> Vec<String> {
    let mut names: Vec<String> = records
        .iter()
        .map(|r| r.name().map(|n| n.to_string()).unwrap_or_default())
        .collect();
    names.sort();
    names
}

/// Asserts that records are in coordinate order, reporting the first violation.
///
/// # Panics
///
/// Panics if any record sorts before its predecessor.
pub fn assert_coordinate_sorted(records: &[RecordBuf]) {
    if is_coordinate_sorted(records) {
        return;
    }
    let keys: Vec<CoordinateKey> = records.iter().map(CoordinateKey::from_record).collect();
    let at = keys.windows(2).position(|w| w[0] > w[1]).unwrap_or_default();
    panic!("records out of order at index {}: {} then {}", at + 1, keys[at], keys[at + 1]);
}

/// Asserts that `actual` holds exactly the records of `expected`, by name.
///
/// # Panics
///
/// Panics if records were lost, duplicated or invented.
pub fn assert_same_records(actual: &[RecordBuf], expected: &[RecordBuf]) {
    assert_eq!(actual.len(), expected.len(), "record count differs");
    assert_eq!(sorted_names(actual), sorted_names(expected), "record names differ");
}

/// Asserts that every unplaced record follows every placed one.
///
/// # Panics
///
/// Panics if a placed record follows an unplaced one.
pub fn assert_unplaced_last(records: &[RecordBuf]) {
    let first_unplaced = records
        .iter()
        .position(|r| CoordinateKey::from_record(r).is_unplaced())
        .unwrap_or(records.len());
    assert!(
        records[first_unplaced..].iter().all(|r| CoordinateKey::from_record(r).is_unplaced()),
        "placed record after unplaced records"
    );
}
