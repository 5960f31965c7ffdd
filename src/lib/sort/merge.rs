//! Multi-way merge of coordinate-sorted inputs.
//!
//! The number of inputs is the number of partitions, which is small, and in the
//! common case the source that just produced a record also produces the next
//! one. The merger therefore keeps its active sources in a sorted `VecDeque`
//! rather than a heap:
//!
//! 1. Write the head of the front source and advance it.
//! 2. If it is exhausted, move it to the finished list.
//! 3. Otherwise compare it with the second source only. If it still sorts
//!    first it stays at the front; if not it is re-inserted by linear scan.
//!
//! Sources are ordered by `(head key, rank)`, where the rank is the input
//! order, so equal keys come out in input order. Unplaced records sort after
//! every placed record of every source.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;

use crate::bam_io::{BamReaderAuto, coordinate_sorted_header, create_bam_reader};
use crate::errors::DupsortError;
use crate::logging::log_merge_summary;
use crate::sort::keys::CoordinateKey;
use crate::sort::sink::{BamSink, RecordSink};

/// A coordinate-sorted stream of records.
pub trait SortedSource {
    /// Name used in log and error messages.
    fn name(&self) -> &str;

    /// Reads the next record, or `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying input cannot be read.
    fn next_record(&mut self) -> Result<Option<RecordBuf>>;
}

/// Sorted BAM file input.
pub struct BamSource {
    name: String,
    reader: BamReaderAuto,
    header: Header,
}

impl BamSource {
    /// Opens a BAM file and reads its header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header cannot be read.
    pub fn open<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let path = path.as_ref();
        let (reader, header) = create_bam_reader(path, threads)?;
        Ok(Self { name: path.display().to_string(), reader, header })
    }

    /// The file's header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl SortedSource for BamSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        let mut record = RecordBuf::default();
        match self.reader.read_record_buf(&self.header, &mut record) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(record)),
            Err(e) => Err(e).with_context(|| format!("Failed to read record from {}", self.name)),
        }
    }
}

/// In-memory sorted input.
pub struct IterSource<I> {
    name: String,
    records: I,
}

impl<I: Iterator<Item = RecordBuf>> IterSource<I> {
    /// Wraps an iterator that yields records in coordinate order.
    pub fn new(name: impl Into<String>, records: I) -> Self {
        Self { name: name.into(), records }
    }
}

impl IterSource<std::vec::IntoIter<RecordBuf>> {
    /// Wraps an already sorted vector.
    pub fn from_records(name: impl Into<String>, records: Vec<RecordBuf>) -> Self {
        Self::new(name, records.into_iter())
    }
}

impl<I: Iterator<Item = RecordBuf>> SortedSource for IterSource<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_record(&mut self) -> Result<Option<RecordBuf>> {
        Ok(self.records.next())
    }
}

/// One input of the merge together with its current head.
struct MergeSource {
    source: Box<dyn SortedSource>,
    head: Option<RecordBuf>,
    /// Key of the current head, or of the last head once finished.
    key: CoordinateKey,
    rank: usize,
    loaded: u64,
    on_unplaced_tail: bool,
}

impl MergeSource {
    fn new(source: Box<dyn SortedSource>, rank: usize) -> Result<Self> {
        let mut merge_source = Self {
            source,
            head: None,
            key: CoordinateKey::UNPLACED,
            rank,
            loaded: 0,
            on_unplaced_tail: false,
        };
        merge_source.load_next()?;
        Ok(merge_source)
    }

    fn is_finished(&self) -> bool {
        self.head.is_none()
    }

    fn cmp_heads(&self, other: &Self) -> Ordering {
        (self.key, self.rank).cmp(&(other.key, other.rank))
    }

    /// Hands out the current head and loads the next record.
    fn advance(&mut self) -> Result<Option<RecordBuf>> {
        let head = self.head.take();
        if head.is_some() {
            self.load_next()?;
        }
        Ok(head)
    }

    fn load_next(&mut self) -> Result<()> {
        let Some(record) = self.source.next_record()? else {
            return Ok(());
        };
        let key = CoordinateKey::from_record(&record);
        if self.loaded > 0 && key < self.key {
            return Err(DupsortError::OutOfOrder {
                source_name: self.source.name().to_string(),
                detail: format!("{key} follows {}", self.key),
            }
            .into());
        }
        if key.is_unplaced() && !self.on_unplaced_tail {
            debug!("{} reached its unplaced records", self.source.name());
            self.on_unplaced_tail = true;
        }
        self.key = key;
        self.head = Some(record);
        self.loaded += 1;
        Ok(())
    }
}

/// Counters reported by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records written.
    pub records: u64,
    /// Number of inputs.
    pub sources: usize,
    /// Times a source had to be re-inserted deeper into the active list.
    pub reorders: u64,
}

/// Merges several coordinate-sorted sources into one sorted stream.
pub struct MultiWayMerger {
    active: VecDeque<MergeSource>,
    finished: Vec<MergeSource>,
    stats: MergeStats,
}

impl MultiWayMerger {
    /// Primes every source with its first record.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read.
    pub fn new(sources: Vec<Box<dyn SortedSource>>) -> Result<Self> {
        let stats = MergeStats { sources: sources.len(), ..MergeStats::default() };
        let mut active = Vec::with_capacity(sources.len());
        let mut finished = Vec::new();
        for (rank, source) in sources.into_iter().enumerate() {
            let merge_source = MergeSource::new(source, rank)?;
            if merge_source.is_finished() {
                finished.push(merge_source);
            } else {
                active.push(merge_source);
            }
        }
        active.sort_by(MergeSource::cmp_heads);
        Ok(Self { active: active.into(), finished, stats })
    }

    /// Writes every record of every source to `sink` in coordinate order.
    ///
    /// The sink is not finished; that is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read, a source is not sorted
    /// ([`DupsortError::OutOfOrder`]), or the sink fails.
    pub fn merge_into<S: RecordSink>(mut self, sink: &mut S) -> Result<MergeStats> {
        while let Some(mut front) = self.active.pop_front() {
            if let Some(record) = front.advance()? {
                sink.write_record(record)?;
                self.stats.records += 1;
            }

            if front.is_finished() {
                self.finished.push(front);
                continue;
            }

            match self.active.front() {
                Some(second) if front.cmp_heads(second) == Ordering::Greater => {
                    let index = self
                        .active
                        .iter()
                        .position(|s| front.cmp_heads(s) == Ordering::Less)
                        .unwrap_or(self.active.len());
                    self.active.insert(index, front);
                    self.stats.reorders += 1;
                }
                _ => self.active.push_front(front),
            }
        }
        debug!("All {} merge sources exhausted", self.finished.len());
        Ok(self.stats)
    }
}

/// Merges coordinate-sorted BAM files into `output`, declaring `SO:coordinate`.
///
/// The output is written with `header`'s references, so all inputs must share
/// the same reference dictionary.
///
/// # Errors
///
/// Returns an error if an input cannot be read or is unsorted, or the output
/// cannot be written.
pub fn merge_bam_files(
    inputs: &[PathBuf],
    output: &Path,
    header: &Header,
    threads: usize,
) -> Result<MergeStats> {
    let sources = inputs
        .iter()
        .map(|path| BamSource::open(path, 1).map(|s| Box::new(s) as Box<dyn SortedSource>))
        .collect::<Result<Vec<_>>>()?;

    let output_header = Arc::new(coordinate_sorted_header(header)?);
    let mut sink = BamSink::create(output.to_path_buf(), output_header, threads)?;
    let stats = MultiWayMerger::new(sources)?.merge_into(&mut sink)?;
    sink.finish()?;

    log_merge_summary(&stats);
    Ok(stats)
}
