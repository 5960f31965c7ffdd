//! Input validation utilities
//!
//! Validation of configuration values, file paths and SAM tags with consistent
//! error messages built from [`crate::errors::DupsortError`].

use crate::errors::{DupsortError, Result};
use noodles::sam::alignment::record::data::field::Tag;
use std::fmt::Display;
use std::path::Path;

/// Validate that a file exists
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use dupsort_lib::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/file.bam", "Input BAM");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(DupsortError::InvalidFileFormat {
            file_type: description.to_string(),
            path: path_ref.display().to_string(),
            reason: "File does not exist".to_string(),
        });
    }
    Ok(())
}

/// Validate that multiple files exist, reporting the first missing one.
///
/// # Errors
/// Returns an error for the first file that doesn't exist
pub fn validate_files_exist<P: AsRef<Path>>(files: &[(P, &str)]) -> Result<()> {
    for (path, desc) in files {
        validate_file_exists(path, desc)?;
    }
    Ok(())
}

/// Convert a two-character string into a SAM tag.
///
/// # Errors
/// Returns an error if the string is not exactly two characters long.
///
/// # Example
/// ```
/// use dupsort_lib::validation::string_to_tag;
///
/// let tag = string_to_tag("MI", "consensus tag").unwrap();
/// assert!(string_to_tag("MID", "consensus tag").is_err());
/// ```
pub fn string_to_tag(tag: &str, name: &str) -> Result<Tag> {
    let bytes = tag.as_bytes();
    if bytes.len() != 2 {
        return Err(DupsortError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Tag must be exactly 2 characters, got: '{tag}'"),
        });
    }
    Ok(Tag::new(bytes[0], bytes[1]))
}

/// Validate that a value is positive (> 0)
///
/// # Errors
/// Returns an error if the value is not positive
///
/// # Example
/// ```
/// use dupsort_lib::validation::validate_positive;
///
/// validate_positive(10, "base-capacity").unwrap();
/// assert!(validate_positive(0, "base-capacity").is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(DupsortError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}
