//! Merge coordinate-sorted BAM files into one sorted, indexed BAM.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use dupsort_lib::bam_io::{create_bam_reader, index_bam};
use dupsort_lib::logging::OperationTimer;
use dupsort_lib::sort::merge::merge_bam_files;
use dupsort_lib::validation::{validate_files_exist, validate_positive};

use crate::commands::command::Command;

/// Merge coordinate-sorted BAM files.
#[derive(Debug, Parser)]
#[command(
    name = "merge",
    about = "\x1b[38;5;72m[OUTPUT]\x1b[0m         \x1b[36mMerge coordinate-sorted BAM files\x1b[0m",
    long_about = r#"
Merge coordinate-sorted BAM files into a single coordinate-sorted BAM.

Records are merged with a multi-way merge that only compares the current
head of each input against the runner-up, so long runs from one input cost
a single comparison per record. Ties keep the order of the inputs on the
command line. Records without a reference or position are written last.

The header of the first input is used for the output, with the sort order
set to coordinate. Unless --no-index is given, a BAI index is written to
<output>.bai.

EXAMPLES:

  # Merge per-partition outputs
  dupsort merge -i part0.bam part1.bam part2.bam -o merged.bam

  # Merge without writing an index
  dupsort merge -i a.bam b.bam -o merged.bam --no-index
"#
)]
pub struct Merge {
    /// Coordinate-sorted input BAM files.
    #[arg(short = 'i', long = "input", num_args = 1.., required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output BAM file.
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Number of threads for BGZF compression of the output.
    #[arg(short = '@', short_alias = 't', long = "threads", default_value = "1")]
    pub threads: usize,

    /// Do not write a BAM index alongside the output.
    #[arg(long = "no-index", default_value = "false")]
    pub no_index: bool,
}

impl Command for Merge {
    fn execute(&self, _command_line: &str) -> Result<()> {
        validate_positive(self.threads, "threads")?;
        let described: Vec<(&PathBuf, &str)> =
            self.inputs.iter().map(|path| (path, "Input BAM")).collect();
        validate_files_exist(&described)?;

        let timer = OperationTimer::new("Merging BAM files");
        info!("Inputs: {}", self.inputs.len());
        for input in &self.inputs {
            info!("  {}", input.display());
        }
        info!("Output: {}", self.output.display());
        info!("Threads: {}", self.threads);

        let (_, header) = create_bam_reader(&self.inputs[0], 1)?;
        let stats = merge_bam_files(&self.inputs, &self.output, &header, self.threads)?;

        if !self.no_index {
            let index_path = index_bam(&self.output)?;
            info!("Wrote BAM index: {}", index_path.display());
        }

        timer.log_completion(stats.records);
        Ok(())
    }
}
