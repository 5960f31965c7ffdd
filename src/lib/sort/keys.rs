//! Coordinate sort key for alignment records.
//!
//! Order: reference sequence id → 1-based alignment start. Records without a
//! placement (no reference id or no start, i.e. an unmapped read whose mate is
//! also unmapped) map to [`CoordinateKey::UNPLACED`] and sort after every
//! placed record. Keys carry no tie breaker: callers rely on stable sorts (or
//! an explicit source rank) so that equal keys keep their insertion order.

use std::fmt;

use noodles::sam::alignment::record_buf::RecordBuf;

/// Sort key for coordinate ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CoordinateKey {
    /// Reference sequence id, or `usize::MAX` for unplaced records.
    pub tid: usize,
    /// 1-based alignment start, or `usize::MAX` for unplaced records.
    pub pos: usize,
}

impl CoordinateKey {
    /// Key shared by every unplaced record.
    pub const UNPLACED: Self = Self { tid: usize::MAX, pos: usize::MAX };

    /// Creates a key for a placed record.
    #[must_use]
    pub const fn new(tid: usize, pos: usize) -> Self {
        Self { tid, pos }
    }

    /// Extracts the key from a record.
    #[must_use]
    pub fn from_record(record: &RecordBuf) -> Self {
        match (record.reference_sequence_id(), record.alignment_start()) {
            (Some(tid), Some(start)) => Self { tid, pos: usize::from(start) },
            _ => Self::UNPLACED,
        }
    }

    /// True for the unplaced tail key.
    #[must_use]
    pub fn is_unplaced(&self) -> bool {
        *self == Self::UNPLACED
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unplaced() { write!(f, "*") } else { write!(f, "{}:{}", self.tid, self.pos) }
    }
}

/// Stable, in-place coordinate sort of a record slice.
pub fn sort_by_coordinate(records: &mut [RecordBuf]) {
    records.sort_by_cached_key(CoordinateKey::from_record);
}

/// Returns true if the records are in non-decreasing coordinate order.
#[must_use]
pub fn is_coordinate_sorted(records: &[RecordBuf]) -> bool {
    records
        .windows(2)
        .all(|w| CoordinateKey::from_record(&w[0]) <= CoordinateKey::from_record(&w[1]))
}
