//! Session orchestrator.
//!
//! Resolves the batch, runs the file server, pushes the URL list and
//! reacts to operator commands until the session is stopped.

use std::future::Future;
use std::io::BufRead;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sideload_file_server::{FileServer, ServerConfig};
use sideload_push::{PushClient, PushOutcome};
use sideload_transfer::{FileBatch, LogSink, TransferProgress};

use crate::control::{ControlHandler, ControlLoop};
use crate::error::SessionError;
use crate::targets::resolve_targets;
use crate::types::{SessionConfig, SessionReport, SessionSinks, SessionState};
use crate::urls::{build_urls, push_payload};

/// Runs one serving session.
pub struct SessionOrchestrator {
    config: SessionConfig,
    sinks: SessionSinks,
    state: Arc<watch::Sender<SessionState>>,
    local_addr: OnceLock<SocketAddr>,
}

impl SessionOrchestrator {
    /// Creates an orchestrator; the config is normalized.
    pub fn new(config: SessionConfig, sinks: SessionSinks) -> Self {
        let (state, _) = watch::channel(SessionState::Init);
        Self {
            config: config.normalized(),
            sinks,
            state: Arc::new(state),
            local_addr: OnceLock::new(),
        }
    }

    /// Subscribes to state changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Address the HTTP listener is bound to, once it is.
    ///
    /// Set before the state becomes [`SessionState::Serving`]; with port 0
    /// this is where the OS-assigned port shows up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Runs the session for `path` until it stops.
    ///
    /// Operator commands are read from `input` on a dedicated thread. The
    /// session also stops when `interrupt` resolves or the server exits.
    /// Resolution and bind failures are returned before anything is pushed.
    pub async fn run<R, F>(
        &self,
        path: impl AsRef<Path>,
        input: R,
        interrupt: F,
    ) -> Result<SessionReport, SessionError>
    where
        R: BufRead + Send + 'static,
        F: Future<Output = ()>,
    {
        self.state.send_replace(SessionState::Building);
        let result = match resolve_targets(path.as_ref()) {
            Ok(targets) => self.serve(targets.into_batch(), input, interrupt).await,
            Err(e) => Err(e),
        };
        self.state.send_replace(SessionState::Stopped);
        result
    }

    /// Like [`run`](Self::run) for a batch the caller already resolved.
    pub async fn run_batch<R, F>(
        &self,
        batch: FileBatch,
        input: R,
        interrupt: F,
    ) -> Result<SessionReport, SessionError>
    where
        R: BufRead + Send + 'static,
        F: Future<Output = ()>,
    {
        self.state.send_replace(SessionState::Building);
        let result = self.serve(batch, input, interrupt).await;
        self.state.send_replace(SessionState::Stopped);
        result
    }

    async fn serve<R, F>(
        &self,
        batch: FileBatch,
        input: R,
        interrupt: F,
    ) -> Result<SessionReport, SessionError>
    where
        R: BufRead + Send + 'static,
        F: Future<Output = ()>,
    {
        let config = &self.config;
        let log = &self.sinks.log;

        let batch = Arc::new(batch);
        let progress = Arc::new(TransferProgress::new(&batch));

        let server = FileServer::new(
            ServerConfig {
                bind_ip: config.bind_ip,
                port: config.port,
                chunk_size: config.chunk_size,
            },
            Arc::clone(&batch),
            Arc::clone(&progress),
            Arc::clone(&self.sinks.progress),
        );
        let bound = server.bind().await.map_err(SessionError::Bind)?;
        let local_addr = bound.local_addr();
        let port = local_addr.port();
        if self.local_addr.set(local_addr).is_err() {
            warn!(%local_addr, "orchestrator reused, keeping the first bound address");
        }

        let names: Vec<&str> = batch.entries().iter().map(|e| e.name.as_str()).collect();
        let urls = build_urls(config.host, port, &names);
        progress.register_files(&urls)?;

        log.append(&format!(
            "START | TARGET={} | HOST={}:{} | DIR={} | FILES={} | BYTES={}",
            config.target,
            config.host,
            port,
            batch.root().display(),
            batch.file_count(),
            batch.total_bytes()
        ));
        log.append("URL LIST:");
        for url in &urls {
            log.append(&format!("  {url}"));
        }

        let cancel = CancellationToken::new();
        let mut server_task = tokio::spawn(bound.serve(cancel.clone()));
        self.state.send_replace(SessionState::Serving);
        log.append("HTTP server started");
        info!(
            device = %config.target,
            port,
            files = batch.file_count(),
            "session serving"
        );

        let pusher = Arc::new(Pusher {
            client: PushClient::new(config.push).with_port(config.receiver_port),
            target: config.target,
            payload: push_payload(&urls),
            log: Arc::clone(log),
            state: Arc::clone(&self.state),
            stop: cancel.clone(),
            active: AsyncMutex::new(()),
            outcomes: Mutex::new(Vec::new()),
        });

        let initial: Option<JoinHandle<()>> = if config.send_on_start {
            let initial = Arc::clone(&pusher);
            Some(tokio::spawn(async move {
                if let Err(e) = initial.push().await {
                    warn!(error = %e, "initial push failed, server keeps running");
                }
            }))
        } else {
            info!("initial push disabled");
            None
        };

        let control = SessionControl {
            pusher: Arc::clone(&pusher),
            runtime: Handle::current(),
            stop: cancel.clone(),
        };
        if let Err(e) = ControlLoop::new(input, control).spawn() {
            cancel.cancel();
            let _ = server_task.await;
            if let Some(initial) = initial {
                let _ = initial.await;
            }
            return Err(e.into());
        }

        let mut server_done = false;
        tokio::select! {
            _ = cancel.cancelled() => info!("stop requested"),
            _ = interrupt => info!("interrupted"),
            result = &mut server_task => {
                server_done = true;
                log_server_exit(result);
            }
        }

        self.state.send_replace(SessionState::Stopping);
        cancel.cancel();
        if !server_done {
            log_server_exit(server_task.await);
        }
        if let Some(initial) = initial
            && let Err(e) = initial.await
        {
            error!(error = %e, "initial push task failed");
        }
        // A resend on the control thread finishes before STOP is written;
        // later ones see the cancelled token and do nothing.
        let _idle = pusher.active.lock().await;

        log.append("STOP");
        let batch_sent = progress.batch_sent();
        info!(batch_sent, "session stopped");

        Ok(SessionReport {
            files: batch.file_count(),
            total_bytes: batch.total_bytes(),
            urls,
            pushes: pusher.outcomes(),
            batch_sent,
        })
    }
}

fn log_server_exit(
    result: Result<Result<(), sideload_file_server::ServerError>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "file server failed"),
        Err(e) => error!(error = %e, "file server task failed"),
    }
}

/// Pushes the session payload and records every outcome.
struct Pusher {
    client: PushClient,
    target: IpAddr,
    payload: Vec<u8>,
    log: Arc<dyn LogSink>,
    state: Arc<watch::Sender<SessionState>>,
    stop: CancellationToken,
    /// Held for the whole of a push; pushes never overlap.
    active: AsyncMutex<()>,
    outcomes: Mutex<Vec<PushOutcome>>,
}

impl Pusher {
    /// Pushes once with retries. `Ok(None)` means the session stopped
    /// first; nothing is logged or recorded then.
    async fn push(&self) -> Result<Option<PushOutcome>, SessionError> {
        let _active = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Ok(None),
            guard = self.active.lock() => guard,
        };
        if self.stop.is_cancelled() {
            return Ok(None);
        }

        self.set_state(SessionState::Serving, SessionState::Pushing);
        info!(device = %self.target, bytes = self.payload.len(), "pushing URL list");

        let retries = self.client.policy().retries;
        let attempts = self
            .client
            .push_with_retries(self.target, &self.payload, |n, attempt| {
                if let Some(err) = &attempt.error {
                    self.log
                        .append(&format!("URL PUSH attempt {n}/{retries} failed: {err}"));
                }
            });
        let outcome = tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            outcome = attempts => Some(outcome),
        };

        self.set_state(SessionState::Pushing, SessionState::Serving);
        let Some(outcome) = outcome else {
            info!("push abandoned, session stopping");
            return Ok(None);
        };

        match (outcome.delivered, outcome.acked) {
            (true, true) => self.log.append("URL PUSH: delivered (ACK received)"),
            (true, false) => self.log.append("URL PUSH: delivered (no ACK)"),
            (false, _) => self.log.append(&format!(
                "URL PUSH FAIL: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            )),
        }
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome.clone());

        if outcome.delivered {
            Ok(Some(outcome))
        } else {
            Err(SessionError::PushDelivery(
                outcome.error.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }

    /// Moves `from` to `to`; any other state (e.g. stopping) is left alone.
    fn set_state(&self, from: SessionState, to: SessionState) {
        self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        });
    }

    fn outcomes(&self) -> Vec<PushOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Operator commands routed into the running session.
struct SessionControl {
    pusher: Arc<Pusher>,
    runtime: Handle,
    stop: CancellationToken,
}

impl ControlHandler for SessionControl {
    fn on_resend(&mut self) {
        if self.stop.is_cancelled() {
            return;
        }
        info!("resend requested");
        self.pusher.log.append("CONTROL | resend");
        if let Err(e) = self.runtime.block_on(self.pusher.push()) {
            warn!(error = %e, "resend failed, server keeps running");
        }
    }

    fn on_stop(&mut self) {
        self.pusher.log.append("CONTROL | quit");
        self.stop.cancel();
    }

    fn on_help(&mut self) {
        self.pusher.log.append("CONTROL | help");
    }
}
