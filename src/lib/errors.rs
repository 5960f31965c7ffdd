//! Custom error types for dupsort operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for dupsort operations
pub type Result<T> = std::result::Result<T, DupsortError>;

/// Error type for dupsort operations
#[derive(Error, Debug)]
pub enum DupsortError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// File format error
    #[error("Invalid {file_type} file '{path}': {reason}")]
    InvalidFileFormat {
        /// Type of file (e.g., "BAM", "interim BAM")
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A post-processing step (sort, merge or index) failed.
    ///
    /// Interim files are left on disk when this is returned.
    #[error("Post-processing step '{step}' failed for '{}': {reason}", target.display())]
    PostProcess {
        /// The failing step
        step: &'static str,
        /// The file the step was producing
        target: PathBuf,
        /// What went wrong (exit status, spawn failure, I/O error)
        reason: String,
    },

    /// A record was submitted to a writer that has already been closed
    #[error("Writer for '{output}' is closed")]
    WriterClosed {
        /// Description of the writer's output
        output: String,
    },

    /// A sorted input produced a record that sorts before its predecessor
    #[error("Input '{source_name}' is not coordinate sorted: {detail}")]
    OutOfOrder {
        /// Name of the offending input
        source_name: String,
        /// The offending keys
        detail: String,
    },
}
