//! Batch file server.
//!
//! Binds a TCP listener, then serves HTTP on it with one task per
//! connection until the cancellation token fires.

use std::future::IntoFuture;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sideload_transfer::{FileBatch, ProgressSink, TransferProgress};

use crate::handler::{AppState, serve_file};
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT, MIN_CHUNK_SIZE, ServerError};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on (all interfaces by default).
    pub bind_ip: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Body chunk size in bytes.
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ServerConfig {
    /// Returns a copy with the chunk size raised to [`MIN_CHUNK_SIZE`].
    pub fn normalized(self) -> Self {
        Self {
            chunk_size: self.chunk_size.max(MIN_CHUNK_SIZE),
            ..self
        }
    }
}

/// HTTP server for the files of one batch.
pub struct FileServer {
    config: ServerConfig,
    batch: Arc<FileBatch>,
    progress: Arc<TransferProgress>,
    sink: Arc<dyn ProgressSink>,
}

impl FileServer {
    pub fn new(
        config: ServerConfig,
        batch: Arc<FileBatch>,
        progress: Arc<TransferProgress>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config: config.normalized(),
            batch,
            progress,
            sink,
        }
    }

    /// Binds the listener. Nothing is accepted until [`BoundServer::serve`].
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = SocketAddr::new(self.config.bind_ip, self.config.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        debug!(%local_addr, "file server bound");

        let state = AppState {
            batch: Arc::clone(&self.batch),
            progress: Arc::clone(&self.progress),
            sink: self.sink,
            chunk_size: self.config.chunk_size,
        };
        let app = Router::new()
            .route("/{filename}", get(serve_file))
            .with_state(state);

        Ok(BoundServer {
            listener,
            local_addr,
            app,
            batch: self.batch,
            progress: self.progress,
        })
    }
}

/// A file server whose listener is bound but not yet accepting.
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
    batch: Arc<FileBatch>,
    progress: Arc<TransferProgress>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Marks the session as serving, then serves until `cancel` fires and
    /// drops the listener.
    ///
    /// Connections accepted before that keep running on their own tasks;
    /// shutdown does not wait for them.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let local_addr = self.local_addr;
        self.progress.mark_serving();
        info!(
            %local_addr,
            files = self.batch.file_count(),
            bytes = self.batch.total_bytes(),
            "file server listening"
        );

        let service = self
            .app
            .into_make_service_with_connect_info::<SocketAddr>();
        let server = axum::serve(self.listener, service).into_future();

        tokio::select! {
            result = server => {
                result?;
                Ok(())
            }
            _ = cancel.cancelled() => {
                info!(%local_addr, "file server shutting down");
                Ok(())
            }
        }
    }
}
