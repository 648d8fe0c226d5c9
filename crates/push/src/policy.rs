use std::time::Duration;

/// Retry and timing policy for a push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushPolicy {
    /// Maximum number of attempts (at least 1).
    pub retries: u32,
    /// Pause between two failed attempts (at least 100 ms).
    pub retry_delay: Duration,
    /// Bound on the TCP connect (at least 100 ms).
    pub connect_timeout: Duration,
    /// How long to wait for an acknowledgment byte. Zero skips the wait.
    pub ack_wait: Duration,
}

const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

impl Default for PushPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            ack_wait: Duration::from_secs(2),
        }
    }
}

impl PushPolicy {
    /// Returns a copy with every minimum applied.
    pub fn normalized(self) -> Self {
        Self {
            retries: self.retries.max(1),
            retry_delay: self.retry_delay.max(MIN_RETRY_DELAY),
            connect_timeout: self.connect_timeout.max(MIN_CONNECT_TIMEOUT),
            ack_wait: self.ack_wait,
        }
    }
}
