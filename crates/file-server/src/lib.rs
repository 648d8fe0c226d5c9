//! HTTP file server for one batch of installer files.
//!
//! Serves `GET /{filename}` for the files of a [`FileBatch`] and nothing
//! else. Every body chunk is accounted in the shared
//! [`TransferProgress`](sideload_transfer::TransferProgress) and reported
//! through a [`ProgressSink`](sideload_transfer::ProgressSink).
//!
//! [`FileBatch`]: sideload_transfer::FileBatch

mod body;
mod handler;
mod server;

pub use server::{BoundServer, FileServer, ServerConfig};

use std::net::SocketAddr;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default body chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Smallest chunk size accepted (16 KiB).
pub const MIN_CHUNK_SIZE: usize = 16 * 1024;

/// Errors produced by the file server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
