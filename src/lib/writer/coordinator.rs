//! Chooses and owns the record writers for a run.
//!
//! | output enabled | multi-output | sort per partition | strategy |
//! |---|---|---|---|
//! | no  | -   | -   | [`WriterStrategy::Discard`]: one [`NullWriter`] |
//! | yes | no  | no  | [`WriterStrategy::Shared`] |
//! | yes | no  | yes | [`WriterStrategy::Shared`] (sorting is left to finalization) |
//! | yes | yes | no  | [`WriterStrategy::Shared`], reused by every partition |
//! | yes | yes | yes | [`WriterStrategy::PerPartition`]: one [`BufferedWriter`] per partition, all falling back to one shared writer |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};
use noodles::sam::Header;
use parking_lot::Mutex;

use crate::bam_io::coordinate_sorted_header;
use crate::config::OutputConfig;
use crate::sort::sink::BamSink;
use crate::writer::{
    BufferedWriter, InterimOutput, NullWriter, RecordWriter, SharedWriter, WriteCounts,
};

/// How records reach disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStrategy {
    /// Output disabled; records are only counted.
    Discard,
    /// Every partition writes to one unsorted file.
    Shared,
    /// Each partition writes its own sorted file.
    PerPartition,
}

impl WriterStrategy {
    /// Strategy selected by a configuration.
    #[must_use]
    pub fn for_config(config: &OutputConfig) -> Self {
        if !config.output_enabled {
            Self::Discard
        } else if config.multi_output && config.sort_per_partition {
            Self::PerPartition
        } else {
            Self::Shared
        }
    }
}

impl fmt::Display for WriterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => write!(f, "discard"),
            Self::Shared => write!(f, "shared"),
            Self::PerPartition => write!(f, "per-partition"),
        }
    }
}

/// Hands out writers to partitions and closes them at the end of a run.
pub struct WriterCoordinator {
    config: OutputConfig,
    strategy: WriterStrategy,
    sorted_header: Arc<Header>,
    fallback: Arc<dyn RecordWriter>,
    partitions: Mutex<BTreeMap<usize, Arc<BufferedWriter>>>,
}

impl WriterCoordinator {
    /// Sets up the writers for `config`.
    ///
    /// Files are created lazily, when their first record arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: OutputConfig, header: &Header) -> Result<Self> {
        config.validate()?;
        let strategy = WriterStrategy::for_config(&config);
        let header = Arc::new(header.clone());
        let sorted_header = Arc::new(coordinate_sorted_header(&header)?);

        let fallback: Arc<dyn RecordWriter> = match strategy {
            WriterStrategy::Discard => Arc::new(NullWriter::new()),
            WriterStrategy::Shared | WriterStrategy::PerPartition => {
                let path = config.shared_interim_path();
                let sink = BamSink::new(path.clone(), header, config.compression_threads);
                Arc::new(SharedWriter::new(sink, Some(InterimOutput::unsorted(path))))
            }
        };
        info!("Writer strategy: {strategy}");

        Ok(Self { config, strategy, sorted_header, fallback, partitions: Mutex::new(BTreeMap::new()) })
    }

    /// The selected strategy.
    #[must_use]
    pub fn strategy(&self) -> WriterStrategy {
        self.strategy
    }

    /// The writer a partition should use. Per-partition writers are created on
    /// first request and returned again on later requests.
    #[must_use]
    pub fn writer_for(&self, partition: usize) -> Arc<dyn RecordWriter> {
        if self.strategy != WriterStrategy::PerPartition {
            return Arc::clone(&self.fallback);
        }
        let mut partitions = self.partitions.lock();
        let writer = partitions.entry(partition).or_insert_with(|| {
            let path = self.config.partition_interim_path(partition);
            debug!("Creating sorted writer for partition {partition}: {}", path.display());
            let sink = BamSink::new(
                path.clone(),
                Arc::clone(&self.sorted_header),
                self.config.compression_threads,
            );
            Arc::new(BufferedWriter::new(
                sink,
                Some(InterimOutput::sorted(path)),
                self.config.base_capacity,
                self.config.position_buffer,
                Arc::clone(&self.fallback),
            ))
        });
        Arc::clone(writer) as Arc<dyn RecordWriter>
    }

    /// Closes every partition writer, then the shared writer they fall back to.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while closing.
    pub fn close(&self) -> Result<()> {
        for writer in self.partitions.lock().values() {
            writer.close()?;
        }
        self.fallback.close()
    }

    /// Sum of the counts of every writer.
    #[must_use]
    pub fn total_written(&self) -> WriteCounts {
        let partitions: WriteCounts = self.partitions.lock().values().map(|w| w.counts()).sum();
        partitions + self.fallback.counts()
    }

    /// Interim files written, per-partition files in partition order and the
    /// shared file last. Writers that wrote nothing are omitted.
    #[must_use]
    pub fn interim_outputs(&self) -> Vec<InterimOutput> {
        let mut outputs: Vec<InterimOutput> =
            self.partitions.lock().values().filter_map(|w| w.output()).collect();
        outputs.extend(self.fallback.output());
        outputs
    }
}
