//! SAM/BAM record helpers.
//!
//! - [`builder`] - fluent builders for records, headers and small BAM fixtures
//! - [`is_unplaced`] - placement check used by the writers

pub mod builder;

use noodles::sam::alignment::record_buf::RecordBuf;

pub use builder::{RecordBuilder, test_header};

/// Returns true if the record has no genomic placement.
///
/// An unmapped read whose mate is mapped carries the mate's reference and
/// position and is therefore placed; an unmapped read with an unmapped (or
/// absent) mate is not.
#[must_use]
pub fn is_unplaced(record: &RecordBuf) -> bool {
    record.reference_sequence_id().is_none() || record.alignment_start().is_none()
}
