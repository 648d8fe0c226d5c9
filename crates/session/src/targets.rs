//! Target path resolution.
//!
//! Turns the operator's path argument into the serving root and the
//! ordered list of installer files. Directories are not walked recursively.

use std::path::{Path, PathBuf};

use sideload_transfer::FileBatch;
use tracing::debug;

use crate::error::SessionError;

/// File extensions the remote installer accepts (lowercase, with dot).
pub const ACCEPTED_EXTENSIONS: &[&str] = &[".cia", ".tik", ".cetk", ".3dsx"];

/// Serving root plus the file names to serve from it, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub root: PathBuf,
    pub files: Vec<String>,
}

impl ResolvedTargets {
    /// Stats every file and builds the session batch.
    pub fn into_batch(self) -> FileBatch {
        FileBatch::from_names(self.root, self.files)
    }
}

fn is_accepted(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ACCEPTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Directory a single file is served from.
fn serving_root(file: &Path) -> PathBuf {
    match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolves a file or directory path into the files to serve.
///
/// A file must carry an accepted extension and is served from its parent
/// directory. A directory contributes its regular files with accepted
/// extensions, sorted by name; an empty result is an error.
pub fn resolve_targets(path: impl AsRef<Path>) -> Result<ResolvedTargets, SessionError> {
    let path = path.as_ref();
    let meta = std::fs::metadata(path).map_err(|_| {
        SessionError::FileResolution(format!("{}: No such file or directory.", path.display()))
    })?;

    if meta.is_file() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_accepted(&name) {
            return Err(SessionError::FileResolution(format!(
                "Unsupported file extension. Supported: {}",
                ACCEPTED_EXTENSIONS.join(", ")
            )));
        }
        return Ok(ResolvedTargets {
            root: serving_root(path),
            files: vec![name],
        });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            debug!(path = ?entry.path(), "skipping non UTF-8 file name");
            continue;
        };
        if !is_accepted(&name) {
            continue;
        }
        // Follows symlinks, so linked installers are served too.
        if std::fs::metadata(entry.path()).is_ok_and(|m| m.is_file()) {
            files.push(name);
        }
    }

    if files.is_empty() {
        return Err(SessionError::FileResolution(
            "No supported files to serve in that directory.".into(),
        ));
    }
    files.sort();

    Ok(ResolvedTargets {
        root: path.to_path_buf(),
        files,
    })
}
