//! Instrumented response body.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::fs::File;
use tokio::io::Take;
use tokio_util::io::ReaderStream;
use tracing::debug;

use sideload_transfer::{ProgressSink, TransferMeter};

/// Streams a file in fixed-size chunks and meters every chunk it yields.
///
/// The terminal event is emitted from here: `Done` once the known size is
/// reached (or the reader is exhausted), `Failed` on a read error or when
/// the body is dropped before that.
pub(crate) struct ProgressStream {
    inner: ReaderStream<Take<File>>,
    meter: TransferMeter,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressStream {
    pub(crate) fn new(
        reader: Take<File>,
        chunk_size: usize,
        meter: TransferMeter,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            inner: ReaderStream::with_capacity(reader, chunk_size),
            meter,
            sink,
        }
    }

    fn finish(&mut self) {
        if let Some(event) = self.meter.finish() {
            debug!(bytes = self.meter.bytes_sent(), "transfer complete");
            self.sink.on_progress(event);
        }
    }

    fn fail(&mut self, reason: String) {
        if let Some(event) = self.meter.fail(reason) {
            self.sink.on_progress(event);
        }
    }
}

impl Stream for ProgressStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(event) = this.meter.record(chunk.len()) {
                    this.sink.on_progress(event);
                }
                if this.meter.is_complete() {
                    this.finish();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.fail(format!("read error: {e}"));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        if !self.meter.is_finished() {
            debug!(bytes = self.meter.bytes_sent(), "body dropped before completion");
            self.fail("aborted by peer".into());
        }
    }
}
