//! BAM file I/O utilities.
//!
//! Helpers for creating BAM readers and writers with consistent error handling,
//! finishing writers so the BGZF EOF marker lands on disk, producing
//! coordinate-sorted headers, and building BAI indexes.
//!
//! # Threading Model
//!
//! BAM files use BGZF compression, which can be parallelized for both reading and writing:
//!
//! - **Single-threaded**: `threads <= 1` (lower overhead; the default for interim files)
//! - **Multi-threaded**: `threads > 1` (higher throughput for the final merged output)

use anyhow::{Context, Result, anyhow};
use bstr::BString;
use noodles::bam::bai;
use noodles::bgzf::io::{
    MultithreadedReader, MultithreadedWriter, Reader as BgzfReader, Writer as BgzfWriter,
};
use noodles::sam::Header;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::header::tag as header_tag;
use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::num::NonZero;
use std::path::{Path, PathBuf};

/// Enum wrapping single-threaded and multi-threaded BGZF readers.
pub enum BgzfReaderEnum {
    /// Single-threaded BGZF reader
    SingleThreaded(BgzfReader<File>),
    /// Multi-threaded BGZF reader
    MultiThreaded(MultithreadedReader<File>),
}

impl Read for BgzfReaderEnum {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.read(buf),
            BgzfReaderEnum::MultiThreaded(r) => r.read(buf),
        }
    }
}

impl BufRead for BgzfReaderEnum {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.fill_buf(),
            BgzfReaderEnum::MultiThreaded(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            BgzfReaderEnum::SingleThreaded(r) => r.consume(amt),
            BgzfReaderEnum::MultiThreaded(r) => r.consume(amt),
        }
    }
}

/// Type alias for a BAM reader that supports both single and multi-threaded BGZF.
pub type BamReaderAuto = noodles::bam::io::Reader<BgzfReaderEnum>;

/// Enum wrapping single-threaded and multi-threaded BGZF writers
pub enum BgzfWriterEnum {
    /// Single-threaded BGZF writer
    SingleThreaded(BgzfWriter<File>),
    /// Multi-threaded BGZF writer
    MultiThreaded(MultithreadedWriter<File>),
}

impl Write for BgzfWriterEnum {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BgzfWriterEnum::SingleThreaded(w) => w.write(buf),
            BgzfWriterEnum::MultiThreaded(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BgzfWriterEnum::SingleThreaded(w) => w.flush(),
            BgzfWriterEnum::MultiThreaded(w) => w.flush(),
        }
    }
}

impl BgzfWriterEnum {
    /// Finish writing and close the writer.
    ///
    /// The multi-threaded writer must be finished explicitly so that all queued
    /// blocks and the EOF marker are written; the single-threaded writer writes
    /// its EOF marker on drop.
    ///
    /// # Errors
    /// Returns an error if flushing or finalizing the writer fails.
    pub fn finish(self) -> io::Result<()> {
        match self {
            BgzfWriterEnum::SingleThreaded(mut w) => {
                w.flush()?;
                Ok(())
            }
            BgzfWriterEnum::MultiThreaded(mut w) => {
                w.finish()?;
                Ok(())
            }
        }
    }
}

/// Type alias for a BAM writer that supports both single and multi-threaded BGZF
pub type BamWriter = noodles::bam::io::Writer<BgzfWriterEnum>;

/// Create a BAM reader and read its header.
///
/// # Errors
/// Returns an error if the file cannot be opened or the header cannot be read
///
/// # Panics
/// Panics if `threads > 1` but `NonZero::new` fails (should not happen).
pub fn create_bam_reader<P: AsRef<Path>>(
    path: P,
    threads: usize,
) -> Result<(BamReaderAuto, Header)> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open input BAM: {}", path_ref.display()))?;

    let bgzf_reader = if threads > 1 {
        let worker_count = NonZero::new(threads).expect("threads > 1 checked above");
        BgzfReaderEnum::MultiThreaded(MultithreadedReader::with_worker_count(worker_count, file))
    } else {
        BgzfReaderEnum::SingleThreaded(BgzfReader::new(file))
    };

    let mut reader = noodles::bam::io::Reader::from(bgzf_reader);
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path_ref.display()))?;

    Ok((reader, header))
}

/// Create a BAM writer and write the header in one operation.
///
/// # Errors
/// Returns an error if the file cannot be created or the header cannot be written
///
/// # Panics
/// Panics if `threads > 1` but `NonZero::new` fails (should not happen).
///
/// # Example
/// ```no_run
/// use dupsort_lib::bam_io::{create_bam_writer, finish_bam_writer};
/// use noodles::sam::Header;
///
/// let header = Header::default();
/// let writer = create_bam_writer("interim.bam", &header, 1).unwrap();
/// finish_bam_writer(writer, "interim.bam").unwrap();
/// ```
pub fn create_bam_writer<P: AsRef<Path>>(
    path: P,
    header: &Header,
    threads: usize,
) -> Result<BamWriter> {
    let path_ref = path.as_ref();
    let output_file = File::create(path_ref)
        .with_context(|| format!("Failed to create output BAM: {}", path_ref.display()))?;

    let bgzf_writer = if threads > 1 {
        let worker_count = NonZero::new(threads).expect("threads > 1 checked above");
        BgzfWriterEnum::MultiThreaded(MultithreadedWriter::with_worker_count(
            worker_count,
            output_file,
        ))
    } else {
        BgzfWriterEnum::SingleThreaded(BgzfWriter::new(output_file))
    };

    let mut writer = noodles::bam::io::Writer::from(bgzf_writer);
    writer
        .write_header(header)
        .with_context(|| format!("Failed to write header to: {}", path_ref.display()))?;
    Ok(writer)
}

/// Flush and close a BAM writer created by [`create_bam_writer`].
///
/// # Errors
/// Returns an error if the final blocks cannot be written.
pub fn finish_bam_writer<P: AsRef<Path>>(writer: BamWriter, path: P) -> Result<()> {
    writer
        .into_inner()
        .finish()
        .with_context(|| format!("Failed to finish BAM: {}", path.as_ref().display()))
}

/// Returns a copy of `header` whose `@HD` line declares `SO:coordinate`.
///
/// Reference sequences, read groups, programs and comments are preserved.
///
/// # Errors
/// Returns an error if the `@HD` record cannot be built.
pub fn coordinate_sorted_header(header: &Header) -> Result<Header> {
    let hd = Map::<noodles::sam::header::record::value::map::Header>::builder()
        .insert(header_tag::SORT_ORDER, BString::from("coordinate"))
        .build()
        .map_err(|e| anyhow!("Failed to build @HD record: {e:?}"))?;

    let mut sorted = header.clone();
    *sorted.header_mut() = Some(hd);
    Ok(sorted)
}

/// Returns true if the header declares `SO:coordinate`.
#[must_use]
pub fn is_coordinate_sorted(header: &Header) -> bool {
    header
        .header()
        .and_then(|hd| hd.other_fields().get(&header_tag::SORT_ORDER))
        .is_some_and(|so| so.as_slice() == b"coordinate")
}

/// The conventional BAI path for a BAM: `<file>.bai` appended to the full name.
#[must_use]
pub fn bai_path_for<P: AsRef<Path>>(bam: P) -> PathBuf {
    let mut name = bam.as_ref().as_os_str().to_owned();
    name.push(".bai");
    PathBuf::from(name)
}

/// Write a BAI index to a file.
///
/// # Errors
/// Returns an error if the file cannot be created or writing the index fails.
pub fn write_bai_index<P: AsRef<Path>>(path: P, index: &bai::Index) -> Result<()> {
    let path_ref = path.as_ref();
    let file = File::create(path_ref)
        .with_context(|| format!("Failed to create index file: {}", path_ref.display()))?;
    let mut writer = bai::io::Writer::new(file);
    writer
        .write_index(index)
        .with_context(|| format!("Failed to write index to: {}", path_ref.display()))?;
    Ok(())
}

/// Build a BAI index for a coordinate-sorted BAM and write it next to the file.
///
/// Returns the path of the written index.
///
/// # Errors
/// Returns an error if the BAM cannot be read or is not indexable.
pub fn index_bam<P: AsRef<Path>>(bam: P) -> Result<PathBuf> {
    let bam_ref = bam.as_ref();
    let index = noodles::bam::fs::index(bam_ref)
        .with_context(|| format!("Failed to index BAM: {}", bam_ref.display()))?;
    let index_path = bai_path_for(bam_ref);
    write_bai_index(&index_path, &index)?;
    Ok(index_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sam::builder::{RecordBuilder, test_header};
    use noodles::sam::alignment::io::Write as AlignmentWrite;
    use tempfile::TempDir;

    #[test]
    fn test_bai_path_for() {
        assert_eq!(bai_path_for("/data/out.bam"), PathBuf::from("/data/out.bam.bai"));
    }

    #[test]
    fn test_coordinate_sorted_header_keeps_references() {
        let header = test_header(&[("chr1", 1000), ("chr2", 2000)]);
        assert!(!is_coordinate_sorted(&header));

        let sorted = coordinate_sorted_header(&header).unwrap();
        assert!(is_coordinate_sorted(&sorted));
        assert_eq!(sorted.reference_sequences().len(), 2);
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rt.bam");
        let header = test_header(&[("chr1", 10_000)]);

        let mut writer = create_bam_writer(&path, &header, 1).unwrap();
        for pos in [10, 20, 30] {
            let record = RecordBuilder::mapped_read().name("r").alignment_start(pos).build();
            writer.write_alignment_record(&header, &record).unwrap();
        }
        finish_bam_writer(writer, &path).unwrap();

        let (mut reader, read_header) = create_bam_reader(&path, 1).unwrap();
        assert_eq!(read_header.reference_sequences().len(), 1);
        let starts: Vec<usize> = reader
            .record_bufs(&read_header)
            .map(|r| r.unwrap().alignment_start().unwrap().get())
            .collect();
        assert_eq!(starts, vec![10, 20, 30]);
    }

    #[test]
    fn test_create_bam_reader_missing_file() {
        let Err(err) = create_bam_reader("/nonexistent/input.bam", 1) else {
            panic!("expected an error for a missing input");
        };
        assert!(err.to_string().contains("Failed to open input BAM"));
    }
}
