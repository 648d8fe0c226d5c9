use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::types::{
    FileBatch, FileIndex, ProgressEvent, TransferFailure, TransferSnapshot, TransferSummary,
};
use crate::{DEFAULT_PROGRESS_INTERVAL, TransferError};

/// Returns `bytes / elapsed` in bytes per second.
///
/// Elapsed time is clamped to 1 ms so a transfer that just started does
/// not divide by zero.
pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 / elapsed.as_secs_f64().max(0.001)
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Session-wide transfer counters shared by every concurrent transfer.
///
/// `batch_sent` is the only state mutated from several tasks; it is a
/// single atomic behind [`add_batch_bytes`](Self::add_batch_bytes). The
/// file index is written once before serving begins and is read-only after.
pub struct TransferProgress {
    file_index: OnceLock<HashMap<String, usize>>,
    file_count: usize,
    batch_total: u64,
    batch_sent: AtomicU64,
    serving: AtomicBool,
    started: Instant,
}

impl TransferProgress {
    /// Creates counters for `batch`; the batch clock starts now.
    pub fn new(batch: &FileBatch) -> Self {
        Self {
            file_index: OnceLock::new(),
            file_count: batch.file_count(),
            batch_total: batch.total_bytes(),
            batch_sent: AtomicU64::new(0),
            serving: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    /// Builds the filename → position map from the batch URL list.
    ///
    /// The key is the percent-decoded last path segment of each URL, which
    /// is what the HTTP router hands to the transfer. Fails if the index is
    /// already populated or serving has started.
    pub fn register_files<S: AsRef<str>>(&self, urls: &[S]) -> Result<(), TransferError> {
        if self.is_serving() {
            return Err(TransferError::Configuration(
                "file index must be registered before serving starts".into(),
            ));
        }

        let index: HashMap<String, usize> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| (decoded_file_name(url.as_ref()), i + 1))
            .collect();
        let entries = index.len();

        self.file_index.set(index).map_err(|_| {
            TransferError::Configuration("file index already registered".into())
        })?;
        debug!(entries, "file index registered");
        Ok(())
    }

    /// Marks the listener as running; the file index is frozen from here on.
    pub fn mark_serving(&self) {
        self.serving.store(true, Ordering::Release);
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    /// Adds `n` bytes to the batch counter and returns the new total.
    pub fn add_batch_bytes(&self, n: u64) -> u64 {
        self.batch_sent.fetch_add(n, Ordering::AcqRel) + n
    }

    pub fn batch_sent(&self) -> u64 {
        self.batch_sent.load(Ordering::Acquire)
    }

    pub fn batch_total(&self) -> u64 {
        self.batch_total
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Time since the batch clock started.
    pub fn batch_elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Percent of the batch sent so far (0 for an empty batch).
    pub fn batch_percent(&self) -> f64 {
        percent(self.batch_sent(), self.batch_total)
    }

    /// Aggregate throughput since the batch clock started.
    pub fn batch_speed(&self) -> f64 {
        bytes_per_second(self.batch_sent(), self.batch_elapsed())
    }

    /// Position of `name` in the batch. Unknown names resolve to `?/N`.
    pub fn index_of(&self, name: &str) -> FileIndex {
        FileIndex {
            position: self.file_index.get().and_then(|m| m.get(name).copied()),
            total: self.file_count,
        }
    }
}

fn decoded_file_name(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url);
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Per-transfer progress state, owned by the task serving one response.
///
/// Nothing in here is shared: only the batch counter in
/// [`TransferProgress`] is touched across tasks.
pub struct TransferMeter {
    progress: Arc<TransferProgress>,
    client: SocketAddr,
    filename: String,
    index: FileIndex,
    file_size: u64,
    sent: u64,
    started: Instant,
    last_report: Option<Instant>,
    finished: bool,
}

impl TransferMeter {
    /// Starts metering a transfer of `filename` (`file_size == 0` means
    /// empty or unknown; no percentages are reported then).
    pub fn start(
        progress: Arc<TransferProgress>,
        client: SocketAddr,
        filename: impl Into<String>,
        file_size: u64,
    ) -> Self {
        let filename = filename.into();
        let index = progress.index_of(&filename);
        Self {
            progress,
            client,
            filename,
            index,
            file_size,
            sent: 0,
            started: Instant::now(),
            last_report: None,
            finished: false,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// `true` once a file of known size has been fully sent.
    pub fn is_complete(&self) -> bool {
        self.file_size > 0 && self.sent >= self.file_size
    }

    /// Accounts for one chunk handed to the connection.
    ///
    /// Returns a periodic event when one is due.
    pub fn record(&mut self, n: usize) -> Option<ProgressEvent> {
        self.record_at(n as u64, Instant::now())
    }

    fn record_at(&mut self, n: u64, now: Instant) -> Option<ProgressEvent> {
        self.sent += n;
        let batch_sent = self.progress.add_batch_bytes(n);

        if self.file_size == 0 {
            return None;
        }
        if let Some(last) = self.last_report
            && now.duration_since(last) < DEFAULT_PROGRESS_INTERVAL
        {
            return None;
        }
        self.last_report = Some(now);

        let speed = bytes_per_second(self.sent, now.duration_since(self.started));
        let remaining = self.file_size.saturating_sub(self.sent);
        let eta = if speed > 0.0 {
            Duration::try_from_secs_f64(remaining as f64 / speed).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        let batch_total = self.progress.batch_total();

        Some(ProgressEvent::Progress(TransferSnapshot {
            client: self.client,
            filename: self.filename.clone(),
            index: self.index,
            bytes_sent: self.sent,
            file_size: self.file_size,
            file_percent: percent(self.sent, self.file_size),
            speed,
            eta,
            batch_sent,
            batch_total,
            batch_percent: percent(batch_sent, batch_total),
            batch_speed: bytes_per_second(batch_sent, self.progress.batch_elapsed()),
        }))
    }

    /// Produces the terminal "done" event. Only the first call after the
    /// source is exhausted returns an event.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let elapsed = self.started.elapsed();
        Some(ProgressEvent::Done(TransferSummary {
            client: self.client,
            filename: self.filename.clone(),
            index: self.index,
            bytes_sent: self.sent,
            elapsed,
            avg_speed: bytes_per_second(self.sent, elapsed),
        }))
    }

    /// Produces the terminal failure event, unless the transfer already ended.
    pub fn fail(&mut self, reason: impl Into<String>) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;

        Some(ProgressEvent::Failed(TransferFailure {
            client: self.client,
            filename: self.filename.clone(),
            index: self.index,
            bytes_sent: self.sent,
            reason: reason.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchEntry;

    fn batch(sizes: &[(&str, u64)]) -> FileBatch {
        FileBatch::new(
            "/srv",
            sizes
                .iter()
                .map(|(name, size)| BatchEntry {
                    name: (*name).into(),
                    size: *size,
                })
                .collect(),
        )
    }

    fn client() -> SocketAddr {
        "192.168.1.76:40000".parse().unwrap()
    }

    #[test]
    fn register_files_decodes_url_segments() {
        let progress = TransferProgress::new(&batch(&[("My Game.cia", 10), ("b.tik", 5)]));
        progress
            .register_files(&[
                "http://10.0.0.2:8080/My%20Game.cia",
                "http://10.0.0.2:8080/b.tik",
            ])
            .unwrap();

        assert_eq!(progress.index_of("My Game.cia").to_string(), "1/2");
        assert_eq!(progress.index_of("b.tik").to_string(), "2/2");
    }

    #[test]
    fn register_files_only_once() {
        let progress = TransferProgress::new(&batch(&[("a.cia", 1)]));
        progress.register_files(&["http://h:1/a.cia"]).unwrap();
        let second = progress.register_files(&["http://h:1/a.cia"]);
        assert!(matches!(second, Err(TransferError::Configuration(_))));
    }

    #[test]
    fn register_files_rejected_after_serving() {
        let progress = TransferProgress::new(&batch(&[("a.cia", 1)]));
        progress.mark_serving();
        let result = progress.register_files(&["http://h:1/a.cia"]);
        assert!(matches!(result, Err(TransferError::Configuration(_))));
    }

    #[test]
    fn unknown_name_is_unresolved() {
        let progress = TransferProgress::new(&batch(&[("a.cia", 1), ("b.cia", 1)]));
        progress.register_files(&["http://h:1/a.cia", "http://h:1/b.cia"]).unwrap();
        let idx = progress.index_of("other.cia");
        assert_eq!(idx.position, None);
        assert_eq!(idx.to_string(), "?/2");
    }

    #[test]
    fn concurrent_batch_increments_are_exact() {
        use std::thread;

        let progress = Arc::new(TransferProgress::new(&batch(&[("a.cia", 0)])));
        let mut handles = Vec::new();

        // 16 threads × 10_000 increments of (i + 1) bytes.
        for i in 0..16u64 {
            let p = Arc::clone(&progress);
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    p.add_batch_bytes(i + 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let expected: u64 = (1..=16u64).map(|n| n * 10_000).sum();
        assert_eq!(progress.batch_sent(), expected);
    }

    #[test]
    fn add_batch_bytes_returns_running_total() {
        let progress = TransferProgress::new(&batch(&[("a.cia", 100)]));
        assert_eq!(progress.add_batch_bytes(40), 40);
        assert_eq!(progress.add_batch_bytes(60), 100);
        assert_eq!(progress.batch_sent(), 100);
        assert!((progress.batch_percent() - 100.0).abs() < 1e-9);
        assert!(progress.batch_speed() > 0.0);
    }

    #[test]
    fn meter_first_chunk_reports_then_throttles() {
        let progress = Arc::new(TransferProgress::new(&batch(&[("a.cia", 1000)])));
        progress.register_files(&["http://h:1/a.cia"]).unwrap();
        let mut meter = TransferMeter::start(Arc::clone(&progress), client(), "a.cia", 1000);
        let t0 = meter.started;

        let first = meter.record_at(100, t0 + Duration::from_millis(10));
        let Some(ProgressEvent::Progress(snap)) = first else {
            panic!("first chunk should report");
        };
        assert_eq!(snap.bytes_sent, 100);
        assert!((snap.file_percent - 10.0).abs() < 1e-9);
        assert!((snap.batch_percent - 10.0).abs() < 1e-9);
        assert_eq!(snap.index.to_string(), "1/1");
        assert!(snap.eta > Duration::ZERO);

        // Within the interval: counted but silent.
        assert!(meter.record_at(100, t0 + Duration::from_millis(50)).is_none());
        assert_eq!(progress.batch_sent(), 200);

        // After the interval: reports again.
        assert!(meter.record_at(100, t0 + Duration::from_millis(120)).is_some());
        assert_eq!(meter.bytes_sent(), 300);
    }

    #[test]
    fn meter_zero_size_never_reports_progress() {
        let progress = Arc::new(TransferProgress::new(&batch(&[("empty.cia", 0)])));
        let mut meter = TransferMeter::start(progress, client(), "empty.cia", 0);

        assert!(meter.record(0).is_none());
        assert!(meter.record(512).is_none());

        let done = meter.finish();
        assert!(matches!(done, Some(ProgressEvent::Done(_))));
        assert!(meter.finish().is_none());
    }

    #[test]
    fn meter_complete_and_finish_once() {
        let progress = Arc::new(TransferProgress::new(&batch(&[("a.cia", 10)])));
        let mut meter = TransferMeter::start(progress, client(), "a.cia", 10);
        meter.record(10);
        assert!(meter.is_complete());

        let Some(ProgressEvent::Done(summary)) = meter.finish() else {
            panic!("expected done");
        };
        assert_eq!(summary.bytes_sent, 10);
        assert!(summary.avg_speed > 0.0);
        assert!(meter.fail("late").is_none());
    }

    #[test]
    fn meter_fail_suppresses_done() {
        let progress = Arc::new(TransferProgress::new(&batch(&[("a.cia", 10)])));
        let mut meter = TransferMeter::start(progress, client(), "a.cia", 10);
        meter.record(4);

        let Some(ProgressEvent::Failed(failure)) = meter.fail("aborted by peer") else {
            panic!("expected failure");
        };
        assert_eq!(failure.bytes_sent, 4);
        assert!(meter.finish().is_none());
    }

    #[test]
    fn speed_clamps_elapsed() {
        assert_eq!(bytes_per_second(0, Duration::ZERO), 0.0);
        assert!((bytes_per_second(1, Duration::ZERO) - 1000.0).abs() < 1e-6);
    }
}
