//! Append-only session audit log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use sideload_transfer::LogSink;

/// Timestamped text file receiving the session's audit lines.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Creates `sideload_log_<timestamp>.txt` in `dir`.
    pub fn create(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let name = format!("sideload_log_{}.txt", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        Self::open(dir.join(name))
    }

    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for AuditLog {
    fn append(&self, line: &str) {
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Err(e) = writeln!(file, "[{stamp}] {line}") {
            tracing::warn!(path = %self.path.display(), error = %e, "audit log write failed");
        }
    }
}
