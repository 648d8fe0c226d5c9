//! Session types.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use sideload_file_server::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT, MIN_CHUNK_SIZE};
use sideload_push::{PushOutcome, PushPolicy, RECEIVER_PORT};
use sideload_transfer::{LogSink, NoopSink, ProgressSink};

/// Immutable parameters of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Device the URL list is pushed to.
    pub target: IpAddr,
    /// Address the device downloads from (goes into the URLs).
    pub host: IpAddr,
    /// HTTP port (0 = OS-assigned; URLs use the bound port).
    pub port: u16,
    /// Interface the HTTP listener binds to.
    pub bind_ip: IpAddr,
    /// Body chunk size in bytes.
    pub chunk_size: usize,
    pub push: PushPolicy,
    /// Receiver port on the device.
    pub receiver_port: u16,
    /// Push once as soon as the listener is up.
    pub send_on_start: bool,
}

impl SessionConfig {
    /// Creates a config with default tunables.
    pub fn new(target: IpAddr, host: IpAddr) -> Self {
        Self {
            target,
            host,
            port: DEFAULT_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            chunk_size: DEFAULT_CHUNK_SIZE,
            push: PushPolicy::default(),
            receiver_port: RECEIVER_PORT,
            send_on_start: true,
        }
    }

    /// Returns a copy with every minimum applied.
    pub fn normalized(self) -> Self {
        Self {
            chunk_size: self.chunk_size.max(MIN_CHUNK_SIZE),
            push: self.push.normalized(),
            ..self
        }
    }
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Building,
    Serving,
    Pushing,
    Stopping,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Building => "building",
            Self::Serving => "serving",
            Self::Pushing => "pushing",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Output capabilities handed to the session.
#[derive(Clone)]
pub struct SessionSinks {
    pub progress: Arc<dyn ProgressSink>,
    pub log: Arc<dyn LogSink>,
}

impl SessionSinks {
    pub fn new(progress: Arc<dyn ProgressSink>, log: Arc<dyn LogSink>) -> Self {
        Self { progress, log }
    }
}

impl Default for SessionSinks {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoopSink),
            log: Arc::new(NoopSink),
        }
    }
}

/// Summary returned when a session ends.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub files: usize,
    pub total_bytes: u64,
    pub urls: Vec<String>,
    /// Every push made, in order.
    pub pushes: Vec<PushOutcome>,
    /// Bytes handed to clients across all transfers.
    pub batch_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn normalized_applies_minimums() {
        let mut config = SessionConfig::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 76)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
        );
        config.chunk_size = 1;
        config.push.retries = 0;
        config.push.retry_delay = Duration::ZERO;

        let config = config.normalized();
        assert_eq!(config.chunk_size, 16 * 1024);
        assert_eq!(config.push.retries, 1);
        assert_eq!(config.push.retry_delay, Duration::from_millis(100));
        assert_eq!(config.port, 8080);
        assert_eq!(config.receiver_port, 5000);
    }
}
