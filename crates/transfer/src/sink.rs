//! Output capabilities the core reports through.
//!
//! Rendering and persistence live outside the core; anything that can take
//! a [`ProgressEvent`] or an audit line plugs in here, closures included.

use crate::types::ProgressEvent;

/// Receives structured transfer events, possibly from many tasks at once.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Append-only session audit trail.
pub trait LogSink: Send + Sync {
    fn append(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn append(&self, line: &str) {
        self(line)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _event: ProgressEvent) {}
}

impl LogSink for NoopSink {
    fn append(&self, _line: &str) {}
}
