//! Sliding-window sort buffer.
//!
//! Partition workers emit records in nearly sorted order: a record may arrive
//! behind its predecessor, but never by more than the declared position buffer.
//! [`SlidingSortBuffer`] holds records until they can no longer be overtaken and
//! commits them to its [`RecordSink`] in exact coordinate order.
//!
//! # Window
//!
//! The buffer tracks, for one active reference sequence at a time:
//!
//! - `last_written`: the position of the last committed record
//! - `upper_bound`: the furthest position a record may still legitimately have
//!
//! Records at or below `upper_bound - position_buffer` are *due*: nothing still
//! to arrive can sort before them. Whenever that threshold passes the smallest
//! pending position, due records are sorted (stably) and written.
//!
//! Records with no placement are kept in a separate tail and written by
//! [`SlidingSortBuffer::flush`] after every placed record.
//!
//! # Panics
//!
//! Committing a record before the last written position would produce an
//! unsorted file. This can only happen when the caller breaks the window
//! contract, so the buffer panics instead of returning an error.

use anyhow::Result;
use log::debug;
use noodles::sam::alignment::record_buf::RecordBuf;

use crate::sort::capacity::{CapacityChange, CapacityPolicy};
use crate::sort::keys::{CoordinateKey, sort_by_coordinate};
use crate::sort::sink::RecordSink;

/// Counters reported when a buffer is flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Records committed to the sink, unplaced tail included.
    pub written: u64,
    /// Number of evictions performed before the final flush.
    pub evictions: u64,
    /// Largest number of placed records pending at once.
    pub peak_pending: usize,
    /// Largest capacity reached.
    pub peak_capacity: usize,
}

/// Re-orders a nearly sorted stream within a bounded window.
pub struct SlidingSortBuffer<S: RecordSink> {
    position_buffer: usize,
    reference: Option<usize>,
    last_written: usize,
    upper_bound: usize,
    pending: Vec<RecordBuf>,
    unplaced: Vec<RecordBuf>,
    /// Smallest pending position, or `usize::MAX` when nothing is pending.
    min_pending: usize,
    adds_since_check: usize,
    policy: CapacityPolicy,
    sink: S,
    stats: BufferStats,
}

impl<S: RecordSink> SlidingSortBuffer<S> {
    /// Creates a buffer writing to `sink`.
    ///
    /// # Panics
    ///
    /// Panics if `base_capacity` is zero.
    #[must_use]
    pub fn new(sink: S, base_capacity: usize, position_buffer: usize) -> Self {
        let policy = CapacityPolicy::new(base_capacity);
        Self {
            position_buffer,
            reference: None,
            last_written: 0,
            upper_bound: 0,
            pending: Vec::with_capacity(policy.capacity()),
            unplaced: Vec::new(),
            min_pending: usize::MAX,
            adds_since_check: 0,
            stats: BufferStats { peak_capacity: policy.capacity(), ..BufferStats::default() },
            policy,
            sink,
        }
    }

    /// Starts (or continues) a region on `reference_sequence_id` at `start`.
    ///
    /// Switching reference commits everything pending on the old one first.
    ///
    /// # Errors
    ///
    /// Returns an error if pending records cannot be written.
    ///
    /// # Panics
    ///
    /// Panics if `reference_sequence_id` is lower than the active reference.
    pub fn initialise(&mut self, reference_sequence_id: usize, start: usize) -> Result<()> {
        match self.reference {
            Some(active) if reference_sequence_id < active => panic!(
                "sliding sort buffer moved from reference {active} back to {reference_sequence_id}"
            ),
            Some(active) if reference_sequence_id == active => {}
            _ => {
                self.drain_pending()?;
                self.reference = Some(reference_sequence_id);
                self.last_written = start;
            }
        }
        self.upper_bound = start.saturating_add(self.position_buffer);
        debug!(
            "Sort window on reference {reference_sequence_id}: [{}, {}]",
            self.last_written, self.upper_bound
        );
        Ok(())
    }

    /// Declares that records up to `position + position_buffer` may still arrive.
    ///
    /// The upper bound never decreases.
    ///
    /// # Errors
    ///
    /// Returns an error if due records cannot be written.
    pub fn raise_upper_bound(&mut self, position: usize) -> Result<()> {
        self.upper_bound = self.upper_bound.max(position.saturating_add(self.position_buffer));
        self.evict_due()
    }

    /// True if `record` is placed on the active reference within
    /// `[last_written, upper_bound]`.
    #[must_use]
    pub fn can_accept(&self, record: &RecordBuf) -> bool {
        let key = CoordinateKey::from_record(record);
        !key.is_unplaced()
            && self.reference == Some(key.tid)
            && (self.last_written..=self.upper_bound).contains(&key.pos)
    }

    /// Adds a record.
    ///
    /// # Errors
    ///
    /// Returns an error if an eviction triggered by this record cannot be written.
    ///
    /// # Panics
    ///
    /// Panics if a placed record is not on the active reference or lies before
    /// the last written position.
    pub fn add(&mut self, record: RecordBuf) -> Result<()> {
        let key = CoordinateKey::from_record(&record);
        if key.is_unplaced() {
            self.unplaced.push(record);
            return Ok(());
        }

        assert!(
            self.reference == Some(key.tid),
            "record at {key} added to a sort buffer on reference {:?}",
            self.reference
        );
        assert!(
            key.pos >= self.last_written,
            "record at {key} added behind last written position {}",
            self.last_written
        );

        self.pending.push(record);
        self.min_pending = self.min_pending.min(key.pos);
        self.stats.peak_pending = self.stats.peak_pending.max(self.pending.len());

        self.adds_since_check += 1;
        if self.adds_since_check >= self.policy.check_interval() {
            self.evict_due()?;
        }
        Ok(())
    }

    /// Sorts and writes everything remaining, then finishes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if records cannot be written or the sink cannot be finished.
    pub fn flush(mut self) -> Result<(S, BufferStats)> {
        self.drain_pending()?;
        for record in std::mem::take(&mut self.unplaced) {
            self.sink.write_record(record)?;
            self.stats.written += 1;
        }
        self.sink.finish()?;
        Ok((self.sink, self.stats))
    }

    /// The active reference, if a region has been started.
    #[must_use]
    pub fn reference(&self) -> Option<usize> {
        self.reference
    }

    /// Position of the last committed record (or the region start).
    #[must_use]
    pub fn last_written(&self) -> usize {
        self.last_written
    }

    /// Furthest position currently accepted.
    #[must_use]
    pub fn upper_bound(&self) -> usize {
        self.upper_bound
    }

    /// Number of placed records awaiting eviction.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of unplaced records held for the tail.
    #[must_use]
    pub fn unplaced_len(&self) -> usize {
        self.unplaced.len()
    }

    /// Current capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.policy.capacity()
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// The underlying sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn evict_due(&mut self) -> Result<()> {
        self.adds_since_check = 0;
        let threshold = self.upper_bound.saturating_sub(self.position_buffer);
        if self.pending.is_empty() || threshold <= self.min_pending {
            return Ok(());
        }

        let pending =
            std::mem::replace(&mut self.pending, Vec::with_capacity(self.policy.capacity()));
        let mut due = Vec::new();
        let mut min_kept = usize::MAX;
        for record in pending {
            let pos = CoordinateKey::from_record(&record).pos;
            if pos <= threshold {
                due.push(record);
            } else {
                min_kept = min_kept.min(pos);
                self.pending.push(record);
            }
        }
        self.min_pending = min_kept;

        self.write_sorted(due)?;
        self.stats.evictions += 1;

        match self.policy.adjust(self.pending.len()) {
            CapacityChange::Grew(capacity) => {
                debug!("Sort buffer grew to {capacity} ({} pending)", self.pending.len());
                self.pending.reserve(capacity.saturating_sub(self.pending.len()));
                self.stats.peak_capacity = self.stats.peak_capacity.max(capacity);
            }
            CapacityChange::Shrank(capacity) => {
                debug!("Sort buffer returned to {capacity} ({} pending)", self.pending.len());
                self.pending.shrink_to(capacity);
            }
            CapacityChange::Unchanged => {}
        }
        Ok(())
    }

    fn drain_pending(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        self.min_pending = usize::MAX;
        self.write_sorted(pending)
    }

    fn write_sorted(&mut self, mut batch: Vec<RecordBuf>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        sort_by_coordinate(&mut batch);

        let first = CoordinateKey::from_record(&batch[0]).pos;
        assert!(
            first >= self.last_written,
            "sorted batch starts at {first}, behind last written position {}",
            self.last_written
        );
        let last = CoordinateKey::from_record(&batch[batch.len() - 1]).pos;

        for record in batch {
            self.sink.write_record(record)?;
            self.stats.written += 1;
        }
        self.last_written = last;
        Ok(())
    }
}
