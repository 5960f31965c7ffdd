//! End-to-end tests of the writers, the coordinator and finalization.

use std::sync::Arc;

use dupsort_lib::bam_io::{bai_path_for, is_coordinate_sorted};
use dupsort_lib::config::OutputConfig;
use dupsort_lib::finalize::{Finalization, Finalizer, NativePostProcessor};
use dupsort_lib::sam::builder::read_test_bam;
use dupsort_lib::sort::{IterSource, MemorySink, MultiWayMerger, SortedSource};
use dupsort_lib::writer::{
    BufferedWriter, NullWriter, RecordKind, RecordWriter, SharedWriter, WriterCoordinator,
    WriterStrategy,
};
use noodles::sam::alignment::record_buf::RecordBuf;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{
    assert_coordinate_sorted, assert_same_records, assert_unplaced_last, nearly_sorted, read_at,
    two_reference_header, unplaced,
};

/// Writes `records` from one thread, driving the region hooks from the records.
///
/// The committed edge trails the furthest position seen by `position_buffer`.
fn write_partition(writer: &dyn RecordWriter, records: Vec<RecordBuf>, position_buffer: usize) {
    let mut furthest: Option<usize> = None;
    for record in records {
        let placement = record
            .reference_sequence_id()
            .zip(record.alignment_start().map(usize::from));
        if let Some((tid, pos)) = placement {
            if furthest.is_none() {
                writer.begin_region(tid, pos.saturating_sub(position_buffer)).unwrap();
            }
            let edge = furthest.map_or(pos, |furthest| furthest.max(pos));
            writer.advance(edge.saturating_sub(position_buffer)).unwrap();
            furthest = Some(edge);
        }
        writer.write(record, RecordKind::Primary).unwrap();
    }
}

fn run_and_finalize(
    config: OutputConfig,
    partitions: Vec<Vec<RecordBuf>>,
    dir: &TempDir,
) -> Finalization {
    let coordinator = WriterCoordinator::new(config.clone(), &two_reference_header()).unwrap();
    let position_buffer = config.position_buffer;
    std::thread::scope(|scope| {
        for (partition, records) in partitions.into_iter().enumerate() {
            let writer = coordinator.writer_for(partition);
            scope.spawn(move || write_partition(writer.as_ref(), records, position_buffer));
        }
    });
    coordinator.close().unwrap();

    let finalizer = Finalizer::new(NativePostProcessor::new(), &config);
    finalizer.finalize(&coordinator.interim_outputs(), &dir.path().join("final.bam")).unwrap()
}

fn partitions() -> Vec<Vec<RecordBuf>> {
    let mut late = nearly_sorted(0, 200, 10, 7);
    // Far behind the partition's leading edge by the time it arrives.
    late.push(read_at("late", 0, 5));
    late.push(unplaced("lonely"));
    vec![late, nearly_sorted(1, 150, 25, 3), vec![unplaced("u1"), unplaced("u2")]]
}

#[rstest]
#[case::per_partition(true, true)]
#[case::shared(false, false)]
#[case::shared_multi(true, false)]
fn test_output_is_sorted_and_complete(#[case] multi_output: bool, #[case] sort_per_partition: bool) {
    let dir = TempDir::new().unwrap();
    let config = OutputConfig::new(dir.path().join("run"))
        .multi_output(multi_output)
        .sort_per_partition(sort_per_partition)
        .threads(2)
        .base_capacity(16)
        .position_buffer(50);
    let expected: Vec<RecordBuf> = partitions().into_iter().flatten().collect();

    let outcome = run_and_finalize(config, partitions(), &dir);
    if multi_output && sort_per_partition {
        assert!(matches!(outcome, Finalization::Merged { ref inputs } if inputs.len() == 4));
    } else {
        assert!(matches!(outcome, Finalization::Sorted { .. }));
    }

    let final_path = dir.path().join("final.bam");
    let (header, records) = read_test_bam(&final_path).unwrap();
    assert!(is_coordinate_sorted(&header));
    assert_coordinate_sorted(&records);
    assert_unplaced_last(&records);
    assert_same_records(&records, &expected);
    assert!(bai_path_for(&final_path).exists());

    // Only the final file and its index remain.
    let mut remaining: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["final.bam", "final.bam.bai"]);
}

#[test]
fn test_discard_produces_nothing() {
    let dir = TempDir::new().unwrap();
    let config = OutputConfig::new(dir.path().join("run")).output_enabled(false);
    let outcome = run_and_finalize(config, partitions(), &dir);
    assert_eq!(outcome, Finalization::Empty);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_per_partition_strategy_forwards_late_records() {
    let dir = TempDir::new().unwrap();
    let config = OutputConfig::new(dir.path().join("run"))
        .multi_output(true)
        .sort_per_partition(true)
        .position_buffer(100);
    let coordinator = WriterCoordinator::new(config, &two_reference_header()).unwrap();
    assert_eq!(coordinator.strategy(), WriterStrategy::PerPartition);

    let writer = coordinator.writer_for(0);
    writer.begin_region(0, 1_000).unwrap();
    writer.write(read_at("inside", 0, 1_050), RecordKind::Primary).unwrap();
    writer.write(read_at("behind", 0, 999), RecordKind::Primary).unwrap();
    writer.write(read_at("ahead", 0, 1_101), RecordKind::Consensus).unwrap();
    writer.write(read_at("other_ref", 1, 1_050), RecordKind::Primary).unwrap();
    coordinator.close().unwrap();

    let counts = writer.counts();
    assert_eq!((counts.primary, counts.consensus, counts.forwarded), (1, 0, 3));
    let total = coordinator.total_written();
    assert_eq!((total.total(), total.consensus), (4, 1));

    let outputs = coordinator.interim_outputs();
    let (_, sorted) = read_test_bam(&outputs[0].path).unwrap();
    assert_eq!(sorted.len(), 1);
    let (_, shared) = read_test_bam(&outputs[1].path).unwrap();
    assert_eq!(shared.len(), 3);
}

#[test]
fn test_three_partition_merge() {
    let sources: Vec<Box<dyn SortedSource>> = vec![
        Box::new(IterSource::from_records("a", vec![read_at("a1", 0, 100), read_at("a2", 0, 500)])),
        Box::new(IterSource::from_records("b", vec![read_at("b1", 0, 150), read_at("b2", 0, 900)])),
        Box::new(IterSource::from_records("c", vec![read_at("c1", 1, 50)])),
    ];
    let mut out: Vec<RecordBuf> = Vec::new();
    let stats = MultiWayMerger::new(sources).unwrap().merge_into(&mut out).unwrap();
    assert_eq!(stats.records, 5);

    let names: Vec<String> = out.iter().map(|r| r.name().unwrap().to_string()).collect();
    assert_eq!(names, vec!["a1", "b1", "a2", "b2", "c1"]);
}

fn buffered_over_memory(position_buffer: usize) -> (BufferedWriter<MemorySink>, MemorySink, MemorySink) {
    let fallback_sink = MemorySink::new();
    let fallback: Arc<dyn RecordWriter> = Arc::new(SharedWriter::new(fallback_sink.clone(), None));
    let sink = MemorySink::new();
    let writer = BufferedWriter::new(sink.clone(), None, 4, position_buffer, fallback);
    (writer, sink, fallback_sink)
}

#[test]
fn test_buffered_writers_over_memory_sinks() {
    let (writer, sink, fallback_sink) = buffered_over_memory(30);

    let mut records = vec![unplaced("u")];
    for (i, pos) in [20, 5, 30, 12, 41, 35, 60, 50].into_iter().enumerate() {
        records.push(read_at(&format!("r{i}"), 0, pos));
    }
    // Far behind the furthest position once 60 has been seen.
    records.push(read_at("late", 0, 8));
    write_partition(&writer, records, 30);
    writer.close().unwrap();

    let written = sink.records();
    assert!(sink.is_finished());
    assert_coordinate_sorted(&written);
    assert_unplaced_last(&written);
    assert_eq!(written.len(), 9);
    assert_eq!(writer.counts().forwarded, 1);
    let names: Vec<String> =
        fallback_sink.records().iter().map(|r| r.name().unwrap().to_string()).collect();
    assert_eq!(names, vec!["late"]);
}

#[rstest]
#[case::jitter_well_inside(1_000, &[100, 110, 105, 120, 118, 130])]
#[case::jitter_at_the_edge(10, &[100, 110, 100, 120, 110, 130, 121])]
#[case::first_record_overtaken(10, &[108, 101, 115, 105])]
fn test_records_within_position_buffer_are_never_forwarded(
    #[case] position_buffer: usize,
    #[case] positions: &[usize],
) {
    let (writer, sink, fallback_sink) = buffered_over_memory(position_buffer);
    let records: Vec<RecordBuf> =
        positions.iter().enumerate().map(|(i, &pos)| read_at(&format!("r{i}"), 0, pos)).collect();
    write_partition(&writer, records, position_buffer);
    writer.close().unwrap();

    assert_eq!(writer.counts().forwarded, 0);
    assert!(fallback_sink.is_empty());
    let written = sink.records();
    assert_eq!(written.len(), positions.len());
    assert_coordinate_sorted(&written);
}

#[test]
fn test_null_writer_counts_only() {
    let writer = NullWriter::new();
    writer.write_batch(nearly_sorted(0, 10, 5, 2), RecordKind::Consensus).unwrap();
    writer.close().unwrap();
    assert_eq!(writer.counts().consensus, 10);
    assert!(writer.output().is_none());
}
