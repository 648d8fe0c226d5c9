//! Error types for the push channel.

/// Errors produced while pushing to the receiver.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),
}
