//! CLI command implementations for dupsort.
//!
//! - [`merge`] - Merge coordinate-sorted BAM files into one indexed BAM
//! - [`resort`] - Re-sort a BAM through per-partition writers and finalize it

#![allow(
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod merge;
pub mod resort;
