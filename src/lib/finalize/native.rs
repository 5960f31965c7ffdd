//! In-process post-processing.
//!
//! # Sort
//!
//! 1. **Accumulate**: read records until the memory limit is reached
//! 2. **Sort**: stable coordinate sort, parallel when more than one thread is available
//! 3. **Spill**: write the sorted chunk to a temporary BAM
//! 4. **Merge**: combine the chunks with the multi-way merger
//!
//! Inputs that fit in memory skip the spill and merge phases.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::info;
use noodles::sam::Header;
use noodles::sam::alignment::record_buf::RecordBuf;
use rayon::prelude::*;
use tempfile::TempDir;

use super::PostProcessor;
use crate::bam_io::{coordinate_sorted_header, create_bam_reader, index_bam};
use crate::logging::format_count;
use crate::sort::keys::CoordinateKey;
use crate::sort::merge::merge_bam_files;
use crate::sort::sink::{BamSink, RecordSink};

/// Default memory limit per chunk (512 MB).
pub const DEFAULT_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

/// Sorts, merges and indexes with `noodles` and the crate's own merger.
#[derive(Debug, Clone)]
pub struct NativePostProcessor {
    memory_limit: usize,
    temp_dir: Option<PathBuf>,
}

impl Default for NativePostProcessor {
    fn default() -> Self {
        Self { memory_limit: DEFAULT_MEMORY_LIMIT, temp_dir: None }
    }
}

/// Statistics from a native sort.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortStats {
    /// Records read and written.
    pub records: u64,
    /// Temporary chunk files written; zero when the input fit in memory.
    pub chunks_written: usize,
}

impl NativePostProcessor {
    /// Creates a post-processor with the default memory limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the approximate memory used for in-memory sorting before spilling.
    #[must_use]
    pub fn memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the parent directory for spill files.
    #[must_use]
    pub fn temp_dir(mut self, path: PathBuf) -> Self {
        self.temp_dir = Some(path);
        self
    }

    /// Coordinate-sorts `input` into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or the output cannot be written.
    pub fn sort_file(&self, input: &Path, output: &Path, threads: usize) -> Result<SortStats> {
        let (mut reader, header) = create_bam_reader(input, 1)?;
        let temp_dir = self.create_temp_dir()?;
        let mut stats = SortStats::default();

        let mut chunk_files: Vec<PathBuf> = Vec::new();
        let mut records: Vec<RecordBuf> = Vec::new();
        let mut memory_used = 0usize;

        for result in reader.record_bufs(&header) {
            let record = result
                .with_context(|| format!("Failed to read record from {}", input.display()))?;
            stats.records += 1;
            memory_used += estimate_record_size(&record);
            records.push(record);

            if memory_used >= self.memory_limit {
                let chunk_path = temp_dir.path().join(format!("chunk_{:04}.bam", chunk_files.len()));
                write_sorted(std::mem::take(&mut records), &header, &chunk_path, threads)?;
                chunk_files.push(chunk_path);
                memory_used = 0;
            }
        }

        if chunk_files.is_empty() {
            write_sorted(records, &coordinate_sorted_header(&header)?, output, threads)?;
        } else {
            if !records.is_empty() {
                let chunk_path = temp_dir.path().join(format!("chunk_{:04}.bam", chunk_files.len()));
                write_sorted(records, &header, &chunk_path, threads)?;
                chunk_files.push(chunk_path);
            }
            info!("Merging {} sorted chunks into {}", chunk_files.len(), output.display());
            merge_bam_files(&chunk_files, output, &header, threads)?;
        }

        stats.chunks_written = chunk_files.len();
        info!(
            "Sorted {} records from {} ({} chunks spilled)",
            format_count(stats.records),
            input.display(),
            stats.chunks_written
        );
        Ok(stats)
    }

    fn create_temp_dir(&self) -> Result<TempDir> {
        match &self.temp_dir {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                TempDir::new_in(base).context("Failed to create temp directory")
            }
            None => TempDir::new().context("Failed to create temp directory"),
        }
    }
}

impl PostProcessor for NativePostProcessor {
    fn sort(&self, input: &Path, output: &Path, threads: usize) -> Result<()> {
        self.sort_file(input, output, threads).map(|_| ())
    }

    fn merge(&self, output: &Path, inputs: &[PathBuf], threads: usize) -> Result<()> {
        let Some(first) = inputs.first() else {
            bail!("No inputs to merge into {}", output.display());
        };
        let (_, header) = create_bam_reader(first, 1)?;
        merge_bam_files(inputs, output, &header, threads).map(|_| ())
    }

    fn index(&self, file: &Path, _threads: usize) -> Result<()> {
        let index_path = index_bam(file)?;
        info!("Wrote BAM index: {}", index_path.display());
        Ok(())
    }
}

/// Stable-sorts `records` and writes them to `path`.
fn write_sorted(
    mut records: Vec<RecordBuf>,
    header: &Header,
    path: &Path,
    threads: usize,
) -> Result<()> {
    if threads > 1 {
        records.par_sort_by_key(CoordinateKey::from_record);
    } else {
        records.sort_by_key(CoordinateKey::from_record);
    }

    let mut sink = BamSink::create(path.to_path_buf(), Arc::new(header.clone()), threads)?;
    for record in records {
        sink.write_record(record)?;
    }
    sink.finish()
}

/// Estimate memory usage of a record.
fn estimate_record_size(record: &RecordBuf) -> usize {
    std::mem::size_of::<RecordBuf>()
        + record.name().map_or(0, |n| n.len())
        + record.sequence().len()
        + record.quality_scores().as_ref().len()
        + record.cigar().as_ref().len() * 4
        + 256
}
