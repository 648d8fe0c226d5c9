//! Batch bookkeeping and progress reporting for one serving session.
//!
//! A [`FileBatch`] is fixed when the session starts. Every HTTP transfer of
//! one of its files drives a [`TransferMeter`], which adds its bytes to the
//! session-wide [`TransferProgress`] counter and turns chunk writes into
//! [`ProgressEvent`]s for a [`ProgressSink`].

mod progress;
mod sink;
mod types;

pub use progress::{TransferMeter, TransferProgress, bytes_per_second};
pub use sink::{LogSink, NoopSink, ProgressSink};
pub use types::{
    BatchEntry, FileBatch, FileIndex, ProgressEvent, TransferFailure, TransferSnapshot,
    TransferSummary,
};

use std::time::Duration;

/// Minimum time between two periodic progress events of one transfer.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("configuration error: {0}")]
    Configuration(String),
}
