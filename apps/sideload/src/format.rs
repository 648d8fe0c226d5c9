//! Formatting helpers for byte sizes, rates and durations.

use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Formats a byte count as a human-readable string (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats bytes per second as MB/s, padded to a fixed width.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{:6.2} MB/s", bytes_per_second / MB as f64)
}

/// Formats a remaining-time estimate in seconds with one decimal.
#[must_use]
pub fn format_eta(eta: Duration) -> String {
    format!("ETA {:5.1}s", eta.as_secs_f64())
}
