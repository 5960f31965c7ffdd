//! Turns the interim files of a run into one sorted, indexed output.
//!
//! | interim files | action |
//! |---|---|
//! | none | nothing to do ([`Finalization::Empty`]) |
//! | one, unsorted | sort into the final path |
//! | one, sorted | rename to the final path |
//! | several | sort the unsorted ones in parallel, then merge everything |
//!
//! The final file is then indexed, and interim files (and the intermediate
//! `*.resorted.bam` files) are deleted unless they are to be kept. If any step
//! fails the interim files are left on disk.
//!
//! The sort, merge and index steps are delegated to a [`PostProcessor`]:
//! [`SamtoolsPostProcessor`] runs `samtools`, [`NativePostProcessor`] does the
//! work in-process.

pub mod native;
pub mod samtools;

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::OutputConfig;
use crate::errors::{DupsortError, Result};
use crate::logging::OperationTimer;
use crate::writer::InterimOutput;

pub use native::NativePostProcessor;
pub use samtools::SamtoolsPostProcessor;

/// Sort, merge and index operations on BAM files.
pub trait PostProcessor: Send + Sync {
    /// Coordinate-sorts `input` into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sort fails.
    fn sort(&self, input: &Path, output: &Path, threads: usize) -> anyhow::Result<()>;

    /// Merges coordinate-sorted `inputs` into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge fails.
    fn merge(&self, output: &Path, inputs: &[PathBuf], threads: usize) -> anyhow::Result<()>;

    /// Indexes the coordinate-sorted `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if indexing fails.
    fn index(&self, file: &Path, threads: usize) -> anyhow::Result<()>;
}

/// What [`Finalizer::finalize`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    /// There was nothing to finalize.
    Empty,
    /// A single unsorted interim file was sorted.
    Sorted {
        /// The interim file.
        input: PathBuf,
    },
    /// A single sorted interim file was renamed.
    Renamed {
        /// The interim file.
        input: PathBuf,
    },
    /// Several interim files were merged.
    Merged {
        /// The sorted files that were merged, in merge order.
        inputs: Vec<PathBuf>,
    },
}

/// Path a sorted copy of an unsorted interim file is written to.
#[must_use]
pub fn resorted_path(path: &Path) -> PathBuf {
    path.with_extension("resorted.bam")
}

/// Drives post-processing of a run's interim files.
pub struct Finalizer<P> {
    post_processor: P,
    threads: usize,
    keep_interim: bool,
}

impl<P: PostProcessor> Finalizer<P> {
    /// Creates a finalizer using the thread budget and retention setting of `config`.
    pub fn new(post_processor: P, config: &OutputConfig) -> Self {
        Self { post_processor, threads: config.threads.max(1), keep_interim: config.keep_interim }
    }

    /// The post-processor in use.
    pub fn post_processor(&self) -> &P {
        &self.post_processor
    }

    /// Produces `final_path` from `interim`.
    ///
    /// # Errors
    ///
    /// Returns [`DupsortError::PostProcess`] naming the failed step. Interim
    /// files are not deleted in that case.
    pub fn finalize(&self, interim: &[InterimOutput], final_path: &Path) -> Result<Finalization> {
        let (outcome, intermediates) = match interim {
            [] => {
                info!("No interim output to finalize");
                return Ok(Finalization::Empty);
            }
            [single] if !single.sorted => {
                let _timer = OperationTimer::new("Sorting interim output");
                self.step("sort", final_path, || {
                    self.post_processor.sort(&single.path, final_path, self.threads)
                })?;
                (Finalization::Sorted { input: single.path.clone() }, Vec::new())
            }
            [single] => {
                info!("Renaming {} to {}", single.path.display(), final_path.display());
                self.step("rename", final_path, || {
                    fs::rename(&single.path, final_path).map_err(anyhow::Error::from)
                })?;
                (Finalization::Renamed { input: single.path.clone() }, Vec::new())
            }
            several => {
                let (inputs, intermediates) = self.sort_unsorted(several)?;
                let _timer = OperationTimer::new("Merging interim outputs");
                self.step("merge", final_path, || {
                    self.post_processor.merge(final_path, &inputs, self.threads)
                })?;
                (Finalization::Merged { inputs }, intermediates)
            }
        };

        self.step("index", final_path, || self.post_processor.index(final_path, self.threads))?;

        if self.keep_interim {
            info!("Keeping {} interim file(s)", interim.len() + intermediates.len());
        } else {
            let interim_paths = interim.iter().map(|o| o.path.as_path());
            remove_files(interim_paths.chain(intermediates.iter().map(PathBuf::as_path)));
        }
        info!("Finalized {}", final_path.display());
        Ok(outcome)
    }

    /// Sorts every unsorted interim file in parallel, dividing the thread budget
    /// between them. Returns all sorted paths in interim order, and the paths
    /// of the files created by sorting.
    fn sort_unsorted(&self, interim: &[InterimOutput]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let unsorted: Vec<&InterimOutput> = interim.iter().filter(|o| !o.sorted).collect();
        if !unsorted.is_empty() {
            let per_sort = (self.threads / unsorted.len()).max(1);
            let workers = unsorted.len().min(self.threads);
            info!("Sorting {} unsorted interim file(s), {per_sort} thread(s) each", unsorted.len());

            let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build().map_err(|e| {
                DupsortError::PostProcess {
                    step: "sort",
                    target: unsorted[0].path.clone(),
                    reason: format!("Failed to build thread pool: {e}"),
                }
            })?;
            pool.install(|| {
                unsorted.par_iter().try_for_each(|output| {
                    let target = resorted_path(&output.path);
                    self.step("sort", &target, || {
                        self.post_processor.sort(&output.path, &target, per_sort)
                    })
                })
            })?;
        }

        let inputs = interim
            .iter()
            .map(|o| if o.sorted { o.path.clone() } else { resorted_path(&o.path) })
            .collect();
        let intermediates = unsorted.iter().map(|o| resorted_path(&o.path)).collect();
        Ok((inputs, intermediates))
    }

    fn step(
        &self,
        step: &'static str,
        target: &Path,
        f: impl FnOnce() -> anyhow::Result<()>,
    ) -> Result<()> {
        debug!("Post-processing step '{step}' for {}", target.display());
        f().map_err(|e| DupsortError::PostProcess {
            step,
            target: target.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }
}

fn remove_files<'a>(paths: impl Iterator<Item = &'a Path>) {
    for path in paths.filter(|p| p.exists()) {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Failed to remove interim file {}: {e}", path.display()),
        }
    }
}
