//! Re-sort a nearly sorted BAM through the partitioned writers.
//!
//! Records are streamed into one partition per reference sequence (records
//! without a placement form a partition of their own). Each partition is
//! written from its own thread through the writer the coordinator hands out,
//! fed through a bounded queue, and the interim files are finalized into the
//! output.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::{Sender, bounded};
use log::{debug, info};
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::RecordBuf;

use dupsort_lib::bam_io::create_bam_reader;
use dupsort_lib::config::OutputConfig;
use dupsort_lib::finalize::{
    Finalization, Finalizer, NativePostProcessor, PostProcessor, SamtoolsPostProcessor,
};
use dupsort_lib::logging::{OperationTimer, format_count, log_write_summary};
use dupsort_lib::sort::CoordinateKey;
use dupsort_lib::validation::string_to_tag;
use dupsort_lib::writer::{InterimOutput, RecordKind, RecordWriter, WriterCoordinator};

use crate::commands::command::Command;
use crate::commands::common::{BamIoOptions, OutputOptions};

/// Records queued between the reader and each partition worker.
const PARTITION_QUEUE_SIZE: usize = 1_024;

/// Tool used to sort, merge and index interim files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PostProcessorArg {
    /// In-process sorting, merging and indexing
    Native,
    /// External `samtools` executable
    Samtools,
}

/// Re-sort a BAM file through per-partition sort buffers.
#[derive(Debug, Parser)]
#[command(
    name = "resort",
    about = "\x1b[38;5;72m[OUTPUT]\x1b[0m         \x1b[36mRe-sort a nearly sorted BAM through partitioned writers\x1b[0m",
    long_about = r#"
Re-sort a nearly coordinate-sorted BAM file the way partition workers of a
deduplication run write their output.

Records are streamed into one partition per reference sequence and each
partition is written from its own thread, fed through a bounded queue, so
memory use does not grow with the size of the input. With --multi-output and
--sort-per-partition (the defaults) every partition keeps a sliding sort
buffer and writes its own sorted interim file; records that arrive too far
behind the partition's leading position go to a shared unsorted file.
Finalization then sorts the unsorted files and merges everything into the
output, which is indexed.

EXAMPLES:

  # Re-sort with the defaults
  dupsort resort -i input.bam -o sorted.bam

  # Single shared file, sorted by samtools at the end
  dupsort resort -i input.bam -o sorted.bam --multi-output false \
    --post-processor samtools --threads 4

  # Count primary and consensus records without writing output
  dupsort resort -i input.bam -o unused.bam --no-output --consensus-tag MI
"#
)]
pub struct Resort {
    #[command(flatten)]
    pub io: BamIoOptions,

    #[command(flatten)]
    pub output_options: OutputOptions,

    /// Records carrying this tag are counted as consensus records.
    #[arg(long = "consensus-tag")]
    pub consensus_tag: Option<String>,

    /// Tool used to sort, merge and index interim files.
    #[arg(long = "post-processor", value_enum, default_value = "native")]
    pub post_processor: PostProcessorArg,

    /// The samtools executable, when --post-processor is samtools.
    #[arg(long = "samtools", default_value = "samtools")]
    pub samtools: String,
}

impl Command for Resort {
    fn execute(&self, _command_line: &str) -> Result<()> {
        self.io.validate()?;
        let consensus_tag = self
            .consensus_tag
            .as_deref()
            .map(|tag| string_to_tag(tag, "consensus-tag"))
            .transpose()?;
        let config = self.output_options.to_config(&self.io.output);

        let timer = OperationTimer::new("Re-sorting BAM");
        info!("Input: {}", self.io.input.display());
        info!("Output: {}", self.io.output.display());
        info!("Interim prefix: {}", config.interim_prefix.display());
        info!("Post-processor: {:?}", self.post_processor);

        let (mut reader, header) = create_bam_reader(&self.io.input, 1)?;
        let coordinator = WriterCoordinator::new(config.clone(), &header)?;
        let position_buffer = config.position_buffer;
        let partitions = std::thread::scope(|scope| -> Result<usize> {
            let mut senders: HashMap<usize, Sender<RecordBuf>> = HashMap::new();
            let mut handles = Vec::new();
            let mut read_result = Ok(());
            for result in reader.record_bufs(&header) {
                let record = match result.with_context(|| {
                    format!("Failed to read record from {}", self.io.input.display())
                }) {
                    Ok(record) => record,
                    Err(e) => {
                        read_result = Err(e);
                        break;
                    }
                };
                let tid = CoordinateKey::from_record(&record).tid;
                let sender = senders.entry(tid).or_insert_with(|| {
                    let (tx, rx) = bounded(PARTITION_QUEUE_SIZE);
                    let writer = coordinator.writer_for(handles.len());
                    handles.push(scope.spawn(move || {
                        write_partition(writer.as_ref(), rx, consensus_tag, position_buffer)
                    }));
                    tx
                });
                // A closed channel means the worker failed; its error surfaces on join.
                if sender.send(record).is_err() {
                    break;
                }
            }
            drop(senders);

            let partitions = handles.len();
            for handle in handles {
                handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
            }
            read_result?;
            Ok(partitions)
        })?;
        info!("Partitions: {partitions}");
        coordinator.close()?;

        let counts = coordinator.total_written();
        log_write_summary(&counts);

        let interim = coordinator.interim_outputs();
        let outcome = match self.post_processor {
            PostProcessorArg::Native => {
                finalize(NativePostProcessor::new(), &config, &interim, &self.io.output)?
            }
            PostProcessorArg::Samtools => finalize(
                SamtoolsPostProcessor::new().executable(&self.samtools),
                &config,
                &interim,
                &self.io.output,
            )?,
        };
        if outcome == Finalization::Empty {
            info!("No output written");
        }

        timer.log_completion(counts.total());
        Ok(())
    }
}

fn finalize<P: PostProcessor>(
    post_processor: P,
    config: &OutputConfig,
    interim: &[InterimOutput],
    output: &Path,
) -> Result<Finalization> {
    let finalizer = Finalizer::new(post_processor, config);
    Ok(finalizer.finalize(interim, output)?)
}

/// Writes the records received for one partition.
///
/// The region opens `position_buffer` bases before the first placed record,
/// and before each record the committed edge is moved to `position_buffer`
/// bases behind the furthest position seen so far. Records may trail the
/// leading edge by up to that many bases and still be sorted in the
/// partition's buffer.
fn write_partition(
    writer: &dyn RecordWriter,
    records: impl IntoIterator<Item = RecordBuf>,
    consensus_tag: Option<Tag>,
    position_buffer: usize,
) -> Result<()> {
    let mut total = 0u64;
    let mut furthest: Option<usize> = None;
    for record in records {
        total += 1;
        let key = CoordinateKey::from_record(&record);
        if !key.is_unplaced() {
            let edge = match furthest {
                None => {
                    writer.begin_region(key.tid, key.pos.saturating_sub(position_buffer))?;
                    key.pos
                }
                Some(furthest) => furthest.max(key.pos),
            };
            writer.advance(edge.saturating_sub(position_buffer))?;
            furthest = Some(edge);
        }

        let kind = match consensus_tag {
            Some(tag) if record.data().get(&tag).is_some() => RecordKind::Consensus,
            _ => RecordKind::Primary,
        };
        writer.write(record, kind)?;
    }
    debug!("Partition finished after {} records", format_count(total));
    Ok(())
}
