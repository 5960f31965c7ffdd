//! Common CLI options shared across commands.
//!
//! These argument structures are composed into command structs using
//! `#[command(flatten)]`.

use std::path::{Path, PathBuf};

use clap::Args;

use dupsort_lib::config::{DEFAULT_BASE_CAPACITY, DEFAULT_POSITION_BUFFER, OutputConfig};
use dupsort_lib::validation::validate_file_exists;

/// Common input/output options for commands that read a BAM and write a BAM.
#[derive(Debug, Clone, Args)]
pub struct BamIoOptions {
    /// Input BAM file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output BAM file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

impl BamIoOptions {
    /// Validates that the input file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_file_exists(&self.input, "Input BAM")?;
        Ok(())
    }
}

/// Options controlling how partition output reaches disk.
#[derive(Debug, Clone, Args)]
pub struct OutputOptions {
    /// Number of threads for finalization (sorting and merging interim files).
    #[arg(short = '@', short_alias = 't', long = "threads", default_value = "1")]
    pub threads: usize,

    /// Initial capacity, in records, of each partition's sort buffer.
    ///
    /// The buffer grows in steps of this size when it fills up and shrinks
    /// back once it drains.
    #[arg(long = "base-capacity", default_value_t = DEFAULT_BASE_CAPACITY)]
    pub base_capacity: usize,

    /// Width, in bases, of the window behind the furthest position a
    /// partition has reached. Records arriving further back than this are
    /// sent to the shared writer instead.
    #[arg(long = "position-buffer", default_value_t = DEFAULT_POSITION_BUFFER)]
    pub position_buffer: usize,

    /// Give each partition its own writer.
    #[arg(long = "multi-output", default_value = "true", action = clap::ArgAction::Set)]
    pub multi_output: bool,

    /// Sort each partition's records while writing.
    ///
    /// Only takes effect together with --multi-output. Without it, all
    /// records go to one unsorted file that is sorted during finalization.
    #[arg(long = "sort-per-partition", default_value = "true", action = clap::ArgAction::Set)]
    pub sort_per_partition: bool,

    /// Keep interim files after finalization.
    #[arg(long = "keep-interim", default_value = "false")]
    pub keep_interim: bool,

    /// Count records without writing any output.
    #[arg(long = "no-output", default_value = "false")]
    pub no_output: bool,

    /// Path prefix for interim files (defaults to the output path without
    /// its extension).
    #[arg(long = "interim-prefix")]
    pub interim_prefix: Option<PathBuf>,

    /// Number of threads for BGZF compression of each interim file.
    #[arg(long = "compression-threads", default_value = "1")]
    pub compression_threads: usize,
}

impl OutputOptions {
    /// Builds the output configuration for a run writing to `output`.
    #[must_use]
    pub fn to_config(&self, output: &Path) -> OutputConfig {
        let prefix = self.interim_prefix.clone().unwrap_or_else(|| output.with_extension(""));
        OutputConfig::new(prefix)
            .threads(self.threads)
            .base_capacity(self.base_capacity)
            .position_buffer(self.position_buffer)
            .multi_output(self.multi_output)
            .sort_per_partition(self.sort_per_partition)
            .keep_interim(self.keep_interim)
            .output_enabled(!self.no_output)
            .compression_threads(self.compression_threads)
    }
}
