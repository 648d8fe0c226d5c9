//! Push client (server side).
//!
//! Connects to the receiver, writes the framed URL list and waits a bounded
//! time for an optional acknowledgment byte.

use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::PushError;
use crate::policy::PushPolicy;
use crate::wire::encode_frame;
use crate::{ACK_POLL_INTERVAL, ACK_POLL_SLEEP, RECEIVER_PORT};

/// Result of a single push try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAttempt {
    /// Connection and write succeeded.
    pub delivered: bool,
    /// A byte came back within the ack window.
    pub acked: bool,
    pub error: Option<String>,
}

impl PushAttempt {
    fn failed(error: PushError) -> Self {
        Self {
            delivered: false,
            acked: false,
            error: Some(error.to_string()),
        }
    }
}

/// Result of a push under the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub delivered: bool,
    pub acked: bool,
    /// Number of attempts made (1..=retries).
    pub attempts: u32,
    /// Error of the last attempt when nothing was delivered.
    pub error: Option<String>,
}

/// Sends URL lists to a device's remote-install receiver.
#[derive(Debug, Clone)]
pub struct PushClient {
    policy: PushPolicy,
    port: u16,
}

impl PushClient {
    /// Creates a client for [`RECEIVER_PORT`]; the policy is normalized.
    pub fn new(policy: PushPolicy) -> Self {
        Self {
            policy: policy.normalized(),
            port: RECEIVER_PORT,
        }
    }

    /// Targets a non-standard receiver port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn policy(&self) -> &PushPolicy {
        &self.policy
    }

    /// Makes one push attempt. Never returns an error: failures are
    /// described in the returned [`PushAttempt`].
    pub async fn push(&self, target: IpAddr, payload: &[u8]) -> PushAttempt {
        let addr = SocketAddr::new(target, self.port);

        let frame = match encode_frame(payload) {
            Ok(f) => f,
            Err(e) => return PushAttempt::failed(e),
        };

        let mut stream = match self.connect(addr).await {
            Ok(s) => s,
            Err(e) => {
                debug!(%addr, error = %e, "push connect failed");
                return PushAttempt::failed(e);
            }
        };

        let written = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        }
        .await;
        if let Err(e) = written {
            debug!(%addr, error = %e, "push write failed");
            let _ = stream.shutdown().await;
            return PushAttempt::failed(e.into());
        }

        let acked = self.wait_for_ack(&mut stream).await;
        let _ = stream.shutdown().await;

        info!(%addr, bytes = payload.len(), acked, "URL list pushed");
        PushAttempt {
            delivered: true,
            acked,
            error: None,
        }
    }

    /// Pushes until one attempt is delivered or `retries` attempts failed.
    ///
    /// `on_attempt` runs after every attempt with its 1-based number.
    pub async fn push_with_retries<F>(
        &self,
        target: IpAddr,
        payload: &[u8],
        mut on_attempt: F,
    ) -> PushOutcome
    where
        F: FnMut(u32, &PushAttempt),
    {
        let retries = self.policy.retries;
        let mut last_error = None;

        for n in 1..=retries {
            let attempt = self.push(target, payload).await;
            on_attempt(n, &attempt);

            if attempt.delivered {
                return PushOutcome {
                    delivered: true,
                    acked: attempt.acked,
                    attempts: n,
                    error: None,
                };
            }

            last_error = attempt.error;
            if n < retries {
                debug!(
                    attempt = n,
                    retries,
                    delay_ms = self.policy.retry_delay.as_millis() as u64,
                    "retrying push"
                );
                sleep(self.policy.retry_delay).await;
            }
        }

        warn!(%target, attempts = retries, error = ?last_error, "push not delivered");
        PushOutcome {
            delivered: false,
            acked: false,
            attempts: retries,
            error: last_error,
        }
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream, PushError> {
        match timeout(self.policy.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(s)) => {
                let _ = s.set_nodelay(true);
                Ok(s)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(PushError::Timeout),
        }
    }

    /// Polls for a single inbound byte until `ack_wait` elapses.
    ///
    /// Any byte counts. EOF or a read error ends the wait unacknowledged.
    async fn wait_for_ack(&self, stream: &mut TcpStream) -> bool {
        let deadline = Instant::now() + self.policy.ack_wait;
        let mut byte = [0u8; 1];

        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let window = (deadline - now).min(ACK_POLL_INTERVAL);
            match timeout(window, stream.read(&mut byte)).await {
                Ok(Ok(0)) => {
                    debug!("receiver closed without ack");
                    return false;
                }
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => {
                    debug!(error = %e, "ack read failed");
                    return false;
                }
                Err(_) => {}
            }

            sleep(ACK_POLL_SLEEP).await;
        }
    }
}
