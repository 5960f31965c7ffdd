//! Output configuration shared by the writer coordinator and the finalizer.

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::validation::validate_positive;

/// Default number of records a sort buffer is sized for.
pub const DEFAULT_BASE_CAPACITY: usize = 10_000;

/// Default distance (in bases) a record may trail the leading edge of its partition.
pub const DEFAULT_POSITION_BUFFER: usize = 1_000;

/// How and where records are written before finalization.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Thread budget for post-processing.
    pub threads: usize,
    /// Base capacity of each partition's sort buffer.
    pub base_capacity: usize,
    /// Width of the sliding sort window, in bases.
    pub position_buffer: usize,
    /// One interim file per partition instead of a single shared one.
    pub multi_output: bool,
    /// Sort each partition's output while it is written.
    pub sort_per_partition: bool,
    /// Keep interim files after finalization.
    pub keep_interim: bool,
    /// When false every record is discarded (counting only).
    pub output_enabled: bool,
    /// Path prefix for interim files.
    pub interim_prefix: PathBuf,
    /// BGZF compression threads per interim file.
    pub compression_threads: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            base_capacity: DEFAULT_BASE_CAPACITY,
            position_buffer: DEFAULT_POSITION_BUFFER,
            multi_output: false,
            sort_per_partition: false,
            keep_interim: false,
            output_enabled: true,
            interim_prefix: PathBuf::from("dupsort"),
            compression_threads: 1,
        }
    }
}

impl OutputConfig {
    /// Creates a configuration writing interim files under `interim_prefix`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(interim_prefix: P) -> Self {
        Self { interim_prefix: interim_prefix.as_ref().to_path_buf(), ..Self::default() }
    }

    /// Set the post-processing thread budget.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the base sort buffer capacity.
    #[must_use]
    pub fn base_capacity(mut self, capacity: usize) -> Self {
        self.base_capacity = capacity;
        self
    }

    /// Set the sliding window width.
    #[must_use]
    pub fn position_buffer(mut self, width: usize) -> Self {
        self.position_buffer = width;
        self
    }

    /// Write one interim file per partition.
    #[must_use]
    pub fn multi_output(mut self, enabled: bool) -> Self {
        self.multi_output = enabled;
        self
    }

    /// Sort each partition's output while it is written.
    #[must_use]
    pub fn sort_per_partition(mut self, enabled: bool) -> Self {
        self.sort_per_partition = enabled;
        self
    }

    /// Keep interim files after finalization.
    #[must_use]
    pub fn keep_interim(mut self, keep: bool) -> Self {
        self.keep_interim = keep;
        self
    }

    /// Enable or disable output.
    #[must_use]
    pub fn output_enabled(mut self, enabled: bool) -> Self {
        self.output_enabled = enabled;
        self
    }

    /// Set the BGZF compression threads per interim file.
    #[must_use]
    pub fn compression_threads(mut self, threads: usize) -> Self {
        self.compression_threads = threads;
        self
    }

    /// Checks that every numeric setting is usable.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        validate_positive(self.threads, "threads")?;
        validate_positive(self.base_capacity, "base-capacity")?;
        validate_positive(self.compression_threads, "compression-threads")?;
        Ok(())
    }

    /// Path of the single shared (unsorted) interim file.
    #[must_use]
    pub fn shared_interim_path(&self) -> PathBuf {
        self.interim_path("shared.unsorted.bam")
    }

    /// Path of a partition's sorted interim file.
    #[must_use]
    pub fn partition_interim_path(&self, partition: usize) -> PathBuf {
        self.interim_path(&format!("part{partition:04}.sorted.bam"))
    }

    fn interim_path(&self, suffix: &str) -> PathBuf {
        let mut name = self.interim_prefix.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }
}
