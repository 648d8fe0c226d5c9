use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

/// One file of the batch as served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// File name relative to the serving root (no separators).
    pub name: String,
    /// Size in bytes (0 when it could not be determined).
    pub size: u64,
}

/// The immutable set of files served during one session.
#[derive(Debug, Clone)]
pub struct FileBatch {
    root: PathBuf,
    entries: Vec<BatchEntry>,
}

impl FileBatch {
    /// Creates a batch from already-sized entries.
    pub fn new(root: impl Into<PathBuf>, entries: Vec<BatchEntry>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    /// Creates a batch by stat-ing each file under `root`.
    ///
    /// Files whose size cannot be read stay in the batch with size 0.
    pub fn from_names<I, S>(root: impl Into<PathBuf>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let root = root.into();
        let entries = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let size = match std::fs::metadata(root.join(&name)) {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        debug!(file = %name, error = %e, "could not stat batch file");
                        0
                    }
                };
                BatchEntry { name, size }
            })
            .collect();
        Self { root, entries }
    }

    /// Directory the files are served from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries in batch order.
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Looks up an entry by its exact file name.
    pub fn get(&self, name: &str) -> Option<&BatchEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Absolute (root-joined) path of an entry.
    pub fn path_of(&self, entry: &BatchEntry) -> PathBuf {
        self.root.join(&entry.name)
    }
}

/// Position of a file within the batch, as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIndex {
    /// 1-based position, `None` when the name is not in the index.
    pub position: Option<usize>,
    pub total: usize,
}

impl fmt::Display for FileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(p) => write!(f, "{p}/{}", self.total),
            None => write!(f, "?/{}", self.total),
        }
    }
}

/// Periodic snapshot of a running transfer.
#[derive(Debug, Clone)]
pub struct TransferSnapshot {
    pub client: SocketAddr,
    pub filename: String,
    pub index: FileIndex,
    pub bytes_sent: u64,
    pub file_size: u64,
    /// Percent of this file sent (0–100).
    pub file_percent: f64,
    /// Bytes per second since the transfer started.
    pub speed: f64,
    /// Estimated time remaining for this file (zero when speed is zero).
    pub eta: Duration,
    pub batch_sent: u64,
    pub batch_total: u64,
    /// Percent of the whole batch sent (0 when the batch total is 0).
    pub batch_percent: f64,
    /// Bytes per second across all transfers since the batch started.
    pub batch_speed: f64,
}

/// Terminal event of a transfer whose source was exhausted.
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub client: SocketAddr,
    pub filename: String,
    pub index: FileIndex,
    pub bytes_sent: u64,
    pub elapsed: Duration,
    /// Average bytes per second over the whole transfer.
    pub avg_speed: f64,
}

/// Terminal event of a transfer that did not complete.
#[derive(Debug, Clone)]
pub struct TransferFailure {
    pub client: SocketAddr,
    pub filename: String,
    pub index: FileIndex,
    pub bytes_sent: u64,
    pub reason: String,
}

/// Event emitted by the file server while serving the batch.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress(TransferSnapshot),
    Done(TransferSummary),
    Failed(TransferFailure),
}

impl ProgressEvent {
    pub fn filename(&self) -> &str {
        match self {
            Self::Progress(s) => &s.filename,
            Self::Done(s) => &s.filename,
            Self::Failed(f) => &f.filename,
        }
    }

    pub fn index(&self) -> FileIndex {
        match self {
            Self::Progress(s) => s.index,
            Self::Done(s) => s.index,
            Self::Failed(f) => f.index,
        }
    }
}
