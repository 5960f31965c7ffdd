//! Coordinate ordering of record streams.
//!
//! - **[`keys`]**: the `(reference, position)` sort key, with unplaced records last
//! - **[`capacity`]**: grow/shrink policy for the sliding buffer's allocation
//! - **[`window`]**: sliding-window buffer that re-orders one partition's nearly sorted output
//! - **[`sink`]**: physical outputs (BAM file, memory) that receive records in final order
//! - **[`merge`]**: multi-way merge of sorted partition outputs into one stream
//!
//! # Architecture
//!
//! 1. **Buffer phase**: each partition feeds a [`SlidingSortBuffer`], which commits
//!    records once nothing still to arrive can sort before them
//! 2. **Merge phase**: the sorted partition files are combined by [`MultiWayMerger`]

pub mod capacity;
pub mod keys;
pub mod merge;
pub mod sink;
pub mod window;

pub use capacity::{CapacityChange, CapacityPolicy};
pub use keys::{CoordinateKey, is_coordinate_sorted, sort_by_coordinate};
pub use merge::{BamSource, IterSource, MergeStats, MultiWayMerger, SortedSource, merge_bam_files};
pub use sink::{BamSink, MemorySink, RecordSink};
pub use window::{BufferStats, SlidingSortBuffer};
