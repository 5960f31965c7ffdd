//! Builders for creating test SAM/BAM records, headers and files.
//!
//! - [`RecordBuilder`]: creates individual `RecordBuf`s with a fluent API
//! - [`test_header`]: a header with the given reference sequences
//! - [`write_test_bam`] / [`read_test_bam`]: small on-disk fixtures
//!
//! ```rust
//! use dupsort_lib::sam::builder::RecordBuilder;
//!
//! let record = RecordBuilder::mapped_read()
//!     .name("read1")
//!     .alignment_start(100)
//!     .build();
//! assert_eq!(record.reference_sequence_id(), Some(0));
//! ```

use std::num::NonZeroUsize;
use std::path::Path;

use anyhow::{Context, Result};
use bstr::BString;
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
use noodles::sam::alignment::record_buf::{QualityScores, RecordBuf, Sequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::ReferenceSequence;

use crate::bam_io::{create_bam_reader, create_bam_writer, finish_bam_writer};

/// Default base quality for generated qualities.
pub const DEFAULT_BASE_QUALITY: u8 = 30;

/// Builder for individual BAM/SAM records.
///
/// Sequences default to a 10 base read; the CIGAR defaults to `{len}M` for
/// records with an alignment start.
#[derive(Debug)]
pub struct RecordBuilder {
    name: Option<Vec<u8>>,
    flags: Flags,
    reference_sequence_id: Option<usize>,
    alignment_start: Option<usize>,
    cigar: Option<String>,
    sequence: Vec<u8>,
    tags: Vec<(Tag, BufValue)>,
}

impl RecordBuilder {
    /// Creates a new builder with no placement and empty flags.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            flags: Flags::empty(),
            reference_sequence_id: None,
            alignment_start: None,
            cigar: None,
            sequence: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Creates a builder pre-configured for a read mapped to reference 0.
    #[must_use]
    pub fn mapped_read() -> Self {
        Self { reference_sequence_id: Some(0), ..Self::new() }
    }

    /// Creates a builder for a paired read where both ends are unmapped.
    ///
    /// Such a record carries no reference or position and sorts last.
    #[must_use]
    pub fn unmapped_pair() -> Self {
        Self::new().paired(true).unmapped(true).mate_unmapped(true)
    }

    /// Sets the read name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.as_bytes().to_vec());
        self
    }

    /// Sets the sequence.
    #[must_use]
    pub fn sequence(mut self, seq: &str) -> Self {
        self.sequence = seq.as_bytes().to_vec();
        self
    }

    /// Sets all flags at once.
    #[must_use]
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the paired flag.
    #[must_use]
    pub fn paired(mut self, paired: bool) -> Self {
        self.flags.set(Flags::SEGMENTED, paired);
        self
    }

    /// Sets the unmapped flag.
    #[must_use]
    pub fn unmapped(mut self, unmapped: bool) -> Self {
        self.flags.set(Flags::UNMAPPED, unmapped);
        self
    }

    /// Sets the mate unmapped flag.
    #[must_use]
    pub fn mate_unmapped(mut self, unmapped: bool) -> Self {
        self.flags.set(Flags::MATE_UNMAPPED, unmapped);
        self
    }

    /// Sets the reference sequence ID (0-based).
    #[must_use]
    pub fn reference_sequence_id(mut self, id: usize) -> Self {
        self.reference_sequence_id = Some(id);
        self
    }

    /// Sets the alignment start position (1-based).
    #[must_use]
    pub fn alignment_start(mut self, pos: usize) -> Self {
        self.alignment_start = Some(pos);
        self
    }

    /// Sets the CIGAR string.
    #[must_use]
    pub fn cigar(mut self, cigar: &str) -> Self {
        self.cigar = Some(cigar.to_string());
        self
    }

    /// Adds a SAM tag. Tags that are not two characters long are ignored.
    #[must_use]
    pub fn tag<V: Into<BufValue>>(mut self, tag: &str, value: V) -> Self {
        let tag_bytes = tag.as_bytes();
        if tag_bytes.len() == 2 {
            self.tags.push((Tag::new(tag_bytes[0], tag_bytes[1]), value.into()));
        }
        self
    }

    /// Builds the `RecordBuf`.
    ///
    /// # Panics
    ///
    /// Panics if a position is zero or the CIGAR string is malformed.
    #[must_use]
    pub fn build(self) -> RecordBuf {
        let mut record = RecordBuf::default();

        if let Some(name) = self.name {
            *record.name_mut() = Some(name.into());
        }
        *record.flags_mut() = self.flags;

        if let Some(ref_id) = self.reference_sequence_id {
            *record.reference_sequence_id_mut() = Some(ref_id);
        }
        if let Some(pos) = self.alignment_start {
            *record.alignment_start_mut() =
                Some(Position::try_from(pos).expect("alignment_start must be >= 1"));
        }

        let sequence =
            if self.sequence.is_empty() { b"ACGTACGTAC".to_vec() } else { self.sequence };
        let placed = self.alignment_start.is_some() && !self.flags.is_unmapped();
        let cigar = match self.cigar {
            Some(cigar) => cigar,
            None if placed => format!("{}M", sequence.len()),
            None => String::new(),
        };
        if !cigar.is_empty() {
            *record.cigar_mut() = parse_cigar(&cigar).into_iter().collect();
        }

        let qualities = vec![DEFAULT_BASE_QUALITY; sequence.len()];
        *record.sequence_mut() = Sequence::from(sequence);
        *record.quality_scores_mut() = QualityScores::from(qualities);

        for (tag, value) in self.tags {
            record.data_mut().insert(tag, value);
        }

        record
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a CIGAR string into operations.
///
/// # Panics
///
/// Panics on a malformed CIGAR string.
#[must_use]
pub fn parse_cigar(cigar_str: &str) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut num_str = String::new();

    for c in cigar_str.chars() {
        if c.is_ascii_digit() {
            num_str.push(c);
        } else {
            let len: usize = num_str.parse().expect("Invalid CIGAR: expected number");
            let kind = match c {
                'M' => Kind::Match,
                'I' => Kind::Insertion,
                'D' => Kind::Deletion,
                'N' => Kind::Skip,
                'S' => Kind::SoftClip,
                'H' => Kind::HardClip,
                '=' => Kind::SequenceMatch,
                'X' => Kind::SequenceMismatch,
                _ => panic!("Unknown CIGAR operation: {c}"),
            };
            ops.push(Op::new(kind, len));
            num_str.clear();
        }
    }

    ops
}

/// Builds a header with the given `(name, length)` reference sequences.
///
/// # Panics
///
/// Panics if a length is zero.
#[must_use]
pub fn test_header(references: &[(&str, usize)]) -> Header {
    let mut builder = Header::builder();
    for (name, length) in references {
        let map = Map::<ReferenceSequence>::new(
            NonZeroUsize::new(*length).expect("reference length must be > 0"),
        );
        builder = builder.add_reference_sequence(BString::from(*name), map);
    }
    builder.build()
}

/// Writes records to a BAM file, in the given order.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_test_bam(path: &Path, header: &Header, records: &[RecordBuf]) -> Result<()> {
    let mut writer = create_bam_writer(path, header, 1)?;
    for record in records {
        writer.write_alignment_record(header, record).context("Failed to write test record")?;
    }
    finish_bam_writer(writer, path)
}

/// Reads every record of a BAM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_test_bam(path: &Path) -> Result<(Header, Vec<RecordBuf>)> {
    let (mut reader, header) = create_bam_reader(path, 1)?;
    let records = reader
        .record_bufs(&header)
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    Ok((header, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_read_defaults() {
        let record = RecordBuilder::mapped_read().name("r1").alignment_start(100).build();
        assert_eq!(record.reference_sequence_id(), Some(0));
        assert_eq!(record.alignment_start().map(usize::from), Some(100));
        assert_eq!(record.sequence().len(), 10);
        assert!(!record.cigar().as_ref().is_empty());
    }

    #[test]
    fn test_unmapped_pair_has_no_placement() {
        let record = RecordBuilder::unmapped_pair().name("u").build();
        assert!(record.flags().is_unmapped());
        assert!(record.flags().is_mate_unmapped());
        assert!(record.reference_sequence_id().is_none());
        assert!(record.cigar().as_ref().is_empty());
    }

    #[test]
    fn test_parse_cigar() {
        let ops = parse_cigar("5S10M2I3D");
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0], Op::new(Kind::SoftClip, 5));
        assert_eq!(ops[3], Op::new(Kind::Deletion, 3));
    }

    #[test]
    fn test_test_header() {
        let header = test_header(&[("chr1", 100), ("chr2", 200)]);
        assert_eq!(header.reference_sequences().len(), 2);
    }
}
