//! Integration tests for dupsort.
//!
//! These tests validate end-to-end workflows that span the writers, the merge
//! and finalization, and run the `dupsort` binary on small BAM files.

mod helpers;
mod test_merge_command;
mod test_pipeline;
mod test_resort_command;
