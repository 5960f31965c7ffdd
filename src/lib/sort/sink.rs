//! Physical record outputs.
//!
//! A [`RecordSink`] is where a buffer or writer commits records once their
//! order is final. [`BamSink`] writes a BAM file, opening it on the first record
//! so that writers which never receive anything leave nothing on disk.
//! [`MemorySink`] and `Vec<RecordBuf>` keep records in memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record_buf::RecordBuf;
use parking_lot::Mutex;

use crate::bam_io::{BamWriter, create_bam_writer, finish_bam_writer};

/// Destination for records whose output order is final.
pub trait RecordSink: Send {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn write_record(&mut self, record: RecordBuf) -> Result<()>;

    /// Flushes and releases the output. Called once, after the last record.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be flushed or closed.
    fn finish(&mut self) -> Result<()>;

    /// Short description used in log and error messages.
    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Lazily opened BAM file output.
pub struct BamSink {
    path: PathBuf,
    header: Arc<Header>,
    threads: usize,
    writer: Option<BamWriter>,
    records: u64,
}

impl BamSink {
    /// Creates a sink that will write `path` with `header` once the first record arrives.
    #[must_use]
    pub fn new(path: PathBuf, header: Arc<Header>, threads: usize) -> Self {
        Self { path, header, threads, writer: None, records: 0 }
    }

    /// Creates a sink and opens the file immediately, so that it exists (with a
    /// header) even if no record is ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: PathBuf, header: Arc<Header>, threads: usize) -> Result<Self> {
        let writer = create_bam_writer(&path, &header, threads)?;
        Ok(Self { path, header, threads, writer: Some(writer), records: 0 })
    }

    /// Output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl RecordSink for BamSink {
    fn write_record(&mut self, record: RecordBuf) -> Result<()> {
        let writer = match self.writer {
            Some(ref mut writer) => writer,
            None => self.writer.insert(create_bam_writer(&self.path, &self.header, self.threads)?),
        };
        writer
            .write_alignment_record(&self.header, &record)
            .with_context(|| format!("Failed to write record to {}", self.path.display()))?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => finish_bam_writer(writer, &self.path),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl RecordSink for Vec<RecordBuf> {
    fn write_record(&mut self, record: RecordBuf) -> Result<()> {
        self.push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory sink whose contents stay readable through cloned handles.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<RecordBuf>>>,
    finished: Arc<Mutex<bool>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far, in write order.
    #[must_use]
    pub fn records(&self) -> Vec<RecordBuf> {
        self.records.lock().clone()
    }

    /// Number of records written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`RecordSink::finish`] has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: RecordBuf) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        *self.finished.lock() = true;
        Ok(())
    }
}
