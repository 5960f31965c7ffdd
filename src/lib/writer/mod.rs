//! Record writers used by partition workers.
//!
//! Three strategies sit behind the [`RecordWriter`] trait:
//!
//! - [`SharedWriter`]: one output guarded by a mutex. Every partition thread
//!   that writes blocks until it holds the lock; this is the only point where
//!   partitions wait on each other.
//! - [`BufferedWriter`]: one partition's private sliding sort buffer. Records
//!   the buffer cannot accept are forwarded to a shared fallback writer.
//! - [`NullWriter`]: discards records but still counts them.
//!
//! Every writer keeps its own atomic counters; totals are read after all
//! producer threads have joined.

pub mod coordinator;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use log::debug;
use noodles::sam::alignment::record_buf::RecordBuf;
use parking_lot::Mutex;

use crate::errors::DupsortError;
use crate::sam::is_unplaced;
use crate::sort::sink::{BamSink, RecordSink};
use crate::sort::window::{BufferStats, SlidingSortBuffer};

pub use coordinator::{WriterCoordinator, WriterStrategy};

/// The caller's classification of a record, used only for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// An ordinary input record.
    Primary,
    /// A record derived from a group of input records.
    Consensus,
}

/// Counts of records written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    /// Primary records written.
    pub primary: u64,
    /// Consensus records written.
    pub consensus: u64,
    /// Records handed to the fallback writer (and counted there).
    pub forwarded: u64,
}

impl WriteCounts {
    /// Primary plus consensus records. Forwarded records are excluded because
    /// the writer that received them already counts them.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.primary + self.consensus
    }
}

impl std::ops::Add for WriteCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            primary: self.primary + other.primary,
            consensus: self.consensus + other.consensus,
            forwarded: self.forwarded + other.forwarded,
        }
    }
}

impl std::iter::Sum for WriteCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, c| acc + c)
    }
}

/// An interim file produced by a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterimOutput {
    /// Location on disk.
    pub path: PathBuf,
    /// Whether the file is already coordinate sorted.
    pub sorted: bool,
}

impl InterimOutput {
    /// An unsorted interim file.
    #[must_use]
    pub fn unsorted(path: PathBuf) -> Self {
        Self { path, sorted: false }
    }

    /// A coordinate-sorted interim file.
    #[must_use]
    pub fn sorted(path: PathBuf) -> Self {
        Self { path, sorted: true }
    }
}

impl fmt::Display for InterimOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.sorted { "sorted" } else { "unsorted" };
        write!(f, "{} ({state})", self.path.display())
    }
}

/// Destination for one or more partitions' records.
pub trait RecordWriter: Send + Sync {
    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Returns [`DupsortError::WriterClosed`] after [`RecordWriter::close`], or an
    /// I/O error from the underlying output.
    fn write(&self, record: RecordBuf, kind: RecordKind) -> Result<()>;

    /// Writes several records of the same kind.
    ///
    /// # Errors
    ///
    /// As for [`RecordWriter::write`].
    fn write_batch(&self, records: Vec<RecordBuf>, kind: RecordKind) -> Result<()> {
        for record in records {
            self.write(record, kind)?;
        }
        Ok(())
    }

    /// Announces that the caller starts a region on `reference_sequence_id` at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if records committed by the region change cannot be written.
    fn begin_region(&self, _reference_sequence_id: usize, _start: usize) -> Result<()> {
        Ok(())
    }

    /// Announces that no further record will start before `position`.
    ///
    /// Callers keep this `position_buffer` bases behind the furthest position
    /// they have written, and advance before writing the record that moved it.
    /// Advancing to the furthest position itself leaves no room for records
    /// that trail it.
    ///
    /// # Errors
    ///
    /// Returns an error if records committed by the advance cannot be written.
    fn advance(&self, _position: usize) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases the output. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be flushed or closed.
    fn close(&self) -> Result<()>;

    /// Counts so far.
    fn counts(&self) -> WriteCounts;

    /// The interim file this writer produced, if it wrote anything to disk.
    fn output(&self) -> Option<InterimOutput>;
}

#[derive(Debug, Default)]
struct Counters {
    primary: AtomicU64,
    consensus: AtomicU64,
    forwarded: AtomicU64,
}

impl Counters {
    fn record(&self, kind: RecordKind) {
        let counter = match kind {
            RecordKind::Primary => &self.primary,
            RecordKind::Consensus => &self.consensus,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WriteCounts {
        WriteCounts {
            primary: self.primary.load(Ordering::Relaxed),
            consensus: self.consensus.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
        }
    }
}

/// One output shared by any number of partition threads.
pub struct SharedWriter<S: RecordSink = BamSink> {
    sink: Mutex<Option<S>>,
    label: String,
    output: Option<InterimOutput>,
    counters: Counters,
}

impl<S: RecordSink> SharedWriter<S> {
    /// Wraps `sink`. `output` describes the file the sink produces, if any.
    pub fn new(sink: S, output: Option<InterimOutput>) -> Self {
        let label = sink.describe();
        Self { sink: Mutex::new(Some(sink)), label, output, counters: Counters::default() }
    }

    fn closed(&self) -> anyhow::Error {
        DupsortError::WriterClosed { output: self.label.clone() }.into()
    }
}

impl<S: RecordSink> RecordWriter for SharedWriter<S> {
    fn write(&self, record: RecordBuf, kind: RecordKind) -> Result<()> {
        let mut guard = self.sink.lock();
        let sink = guard.as_mut().ok_or_else(|| self.closed())?;
        sink.write_record(record)?;
        self.counters.record(kind);
        Ok(())
    }

    fn write_batch(&self, records: Vec<RecordBuf>, kind: RecordKind) -> Result<()> {
        let mut guard = self.sink.lock();
        let sink = guard.as_mut().ok_or_else(|| self.closed())?;
        for record in records {
            sink.write_record(record)?;
            self.counters.record(kind);
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(mut sink) = self.sink.lock().take() {
            sink.finish()?;
            debug!("Closed shared writer {}", self.label);
        }
        Ok(())
    }

    fn counts(&self) -> WriteCounts {
        self.counters.snapshot()
    }

    fn output(&self) -> Option<InterimOutput> {
        self.output.clone().filter(|_| self.counts().total() > 0)
    }
}

/// A partition's private sort buffer with a shared fallback.
///
/// A record goes into the buffer when the buffer can take it: unplaced records
/// always (they are written after the partition's placed records), placed
/// records when they lie inside the current window. Anything else is forwarded
/// to the fallback writer, which counts it as written; this writer counts it
/// only as `forwarded`.
pub struct BufferedWriter<S: RecordSink = BamSink> {
    buffer: Mutex<Option<SlidingSortBuffer<S>>>,
    fallback: Arc<dyn RecordWriter>,
    label: String,
    output: Option<InterimOutput>,
    counters: Counters,
    stats: Mutex<Option<BufferStats>>,
}

impl<S: RecordSink> BufferedWriter<S> {
    /// Creates a writer whose buffer writes to `sink`.
    pub fn new(
        sink: S,
        output: Option<InterimOutput>,
        base_capacity: usize,
        position_buffer: usize,
        fallback: Arc<dyn RecordWriter>,
    ) -> Self {
        let label = sink.describe();
        Self {
            buffer: Mutex::new(Some(SlidingSortBuffer::new(sink, base_capacity, position_buffer))),
            fallback,
            label,
            output,
            counters: Counters::default(),
            stats: Mutex::new(None),
        }
    }

    /// Buffer statistics, available once the writer has been closed.
    pub fn buffer_stats(&self) -> Option<BufferStats> {
        *self.stats.lock()
    }

    fn with_buffer<T>(&self, f: impl FnOnce(&mut SlidingSortBuffer<S>) -> Result<T>) -> Result<T> {
        let mut guard = self.buffer.lock();
        let buffer = guard
            .as_mut()
            .ok_or_else(|| DupsortError::WriterClosed { output: self.label.clone() })?;
        f(buffer)
    }
}

impl<S: RecordSink> RecordWriter for BufferedWriter<S> {
    fn write(&self, record: RecordBuf, kind: RecordKind) -> Result<()> {
        let rejected = self.with_buffer(|buffer| {
            if is_unplaced(&record) || buffer.can_accept(&record) {
                buffer.add(record)?;
                Ok(None)
            } else {
                Ok(Some(record))
            }
        })?;

        match rejected {
            None => self.counters.record(kind),
            Some(record) => {
                self.fallback.write(record, kind)?;
                self.counters.forwarded();
            }
        }
        Ok(())
    }

    fn begin_region(&self, reference_sequence_id: usize, start: usize) -> Result<()> {
        self.with_buffer(|buffer| buffer.initialise(reference_sequence_id, start))
    }

    fn advance(&self, position: usize) -> Result<()> {
        self.with_buffer(|buffer| buffer.raise_upper_bound(position))
    }

    fn close(&self) -> Result<()> {
        let Some(buffer) = self.buffer.lock().take() else {
            return Ok(());
        };
        let (_, stats) = buffer.flush()?;
        debug!(
            "Closed sorted writer {}: {} written, {} evictions, peak {} pending, peak capacity {}",
            self.label, stats.written, stats.evictions, stats.peak_pending, stats.peak_capacity
        );
        *self.stats.lock() = Some(stats);
        Ok(())
    }

    fn counts(&self) -> WriteCounts {
        self.counters.snapshot()
    }

    fn output(&self) -> Option<InterimOutput> {
        self.output.clone().filter(|_| self.counts().total() > 0)
    }
}

/// Discards every record.
#[derive(Debug, Default)]
pub struct NullWriter {
    counters: Counters,
}

impl NullWriter {
    /// Creates a discarding writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordWriter for NullWriter {
    fn write(&self, _record: RecordBuf, kind: RecordKind) -> Result<()> {
        self.counters.record(kind);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn counts(&self) -> WriteCounts {
        self.counters.snapshot()
    }

    fn output(&self) -> Option<InterimOutput> {
        None
    }
}
