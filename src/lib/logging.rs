//! Logging helpers for formatted output.
//!
//! Consistent formatting for record counts, durations and rates, plus summaries
//! of writer and merge statistics. Logging itself goes through the `log` facade;
//! the binary installs `env_logger`.

use std::time::{Duration, Instant};

use log::info;

use crate::sort::merge::MergeStats;
use crate::writer::WriteCounts;

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use dupsort_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a percentage with the given number of decimal places.
///
/// ```
/// use dupsort_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a duration in human-readable form ("45s", "2m 15s", "1h 30m").
///
/// ```
/// use dupsort_lib::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a processing rate as records per second (or per minute when slow).
#[must_use]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} records/s", format_count(count));
    }

    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} records/s", format_count(rate as u64))
    } else {
        let per_min = count as f64 / (secs / 60.0);
        format!("{per_min:.1} records/min")
    }
}

/// Logs totals gathered from the record writers.
pub fn log_write_summary(counts: &WriteCounts) {
    let total = counts.total();
    info!("Records written: {}", format_count(total));
    if total > 0 {
        info!(
            "  primary: {} ({}), consensus: {} ({})",
            format_count(counts.primary),
            format_percent(counts.primary as f64 / total as f64, 2),
            format_count(counts.consensus),
            format_percent(counts.consensus as f64 / total as f64, 2)
        );
    }
    if counts.forwarded > 0 {
        info!("  forwarded to shared writer: {}", format_count(counts.forwarded));
    }
}

/// Logs the outcome of a multi-way merge.
pub fn log_merge_summary(stats: &MergeStats) {
    info!(
        "Merged {} records from {} sources ({} re-insertions)",
        format_count(stats.records),
        stats.sources,
        format_count(stats.reorders)
    );
}

/// Times an operation and logs its completion with a record count and rate.
///
/// ```no_run
/// use dupsort_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Merging interim files");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Time elapsed since the timer was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs the completion with record count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        info!(
            "{} completed: {} in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}
