//! Request handler for batch files.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use sideload_transfer::{FileBatch, ProgressSink, TransferMeter, TransferProgress};

use crate::body::ProgressStream;

/// State shared by every connection task.
#[derive(Clone)]
pub(crate) struct AppState {
    pub batch: Arc<FileBatch>,
    pub progress: Arc<TransferProgress>,
    pub sink: Arc<dyn ProgressSink>,
    pub chunk_size: usize,
}

/// `GET /{filename}`: streams one batch file.
///
/// The name arrives percent-decoded. Only exact batch entry names are
/// served; the file path is built from the entry, never from the request.
pub(crate) async fn serve_file(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    method: Method,
    Path(filename): Path<String>,
) -> Response {
    let Some(entry) = state.batch.get(&filename) else {
        debug!(%client, file = %filename, "request outside the batch");
        return StatusCode::NOT_FOUND.into_response();
    };
    let path = state.batch.path_of(entry);

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!(%client, file = %entry.name, error = %e, "cannot open batch file");
            let mut meter =
                TransferMeter::start(Arc::clone(&state.progress), client, entry.name.clone(), 0);
            if let Some(event) = meter.fail(format!("cannot open file: {e}")) {
                state.sink.on_progress(event);
            }
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let known_size = match file.metadata().await {
        Ok(meta) => Some(meta.len()),
        Err(e) => {
            debug!(file = %entry.name, error = %e, "size unknown");
            None
        }
    };

    if method == Method::HEAD {
        return with_headers(Body::empty(), known_size);
    }

    let meter = TransferMeter::start(
        Arc::clone(&state.progress),
        client,
        entry.name.clone(),
        known_size.unwrap_or(0),
    );
    info!(
        %client,
        file = %entry.name,
        index = %state.progress.index_of(&entry.name),
        size = known_size.unwrap_or(0),
        "transfer started"
    );

    if known_size == Some(0) {
        let mut meter = meter;
        if let Some(event) = meter.finish() {
            state.sink.on_progress(event);
        }
        return with_headers(Body::empty(), Some(0));
    }

    let reader = file.take(known_size.unwrap_or(u64::MAX));
    let stream = ProgressStream::new(reader, state.chunk_size, meter, Arc::clone(&state.sink));
    with_headers(Body::from_stream(stream), known_size)
}

fn with_headers(body: Body, known_size: Option<u64>) -> Response {
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(size) = known_size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    response
}
