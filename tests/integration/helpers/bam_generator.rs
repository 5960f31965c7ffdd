//! Utilities for generating test records and BAM files programmatically.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dupsort_lib::sam::builder::{RecordBuilder, test_header, write_test_bam};
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;

/// Header with two 100kb references, `chr1` and `chr2`.
pub fn two_reference_header() -> Header {
    test_header(&[("chr1", 100_000), ("chr2", 100_000)])
}

/// A mapped read named `name` at `pos` on reference `tid`.
pub fn read_at(name: &str, tid: usize, pos: usize) -> RecordBuf {
    RecordBuilder::mapped_read().name(name).reference_sequence_id(tid).alignment_start(pos).build()
}

/// A read pair member with neither end mapped.
pub fn unplaced(name: &str) -> RecordBuf {
    RecordBuilder::unmapped_pair().name(name).build()
}

/// `count` reads on `tid` spaced `step` bases apart, with every `swap_every`-th
/// pair of neighbours swapped so the stream is only nearly sorted.
pub fn nearly_sorted(tid: usize, count: usize, step: usize, swap_every: usize) -> Vec<RecordBuf> {
    let mut positions: Vec<usize> = (0..count).map(|i| 1 + i * step).collect();
    for i in (1..count).step_by(swap_every.max(2)) {
        positions.swap(i - 1, i);
    }
    positions
        .into_iter()
        .enumerate()
        .map(|(i, pos)| read_at(&format!("t{tid}_r{i}"), tid, pos))
        .collect()
}

/// Writes `records` to `dir/name` and returns the path.
pub fn write_bam(dir: &Path, name: &str, header: &Header, records: &[RecordBuf]) -> PathBuf {
    let path = dir.join(name);
    write_test_bam(&path, header, records).expect("Failed to write test BAM");
    path
}
