//! Session error types.

use sideload_file_server::ServerError;
use sideload_transfer::TransferError;

/// Errors produced while running a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    FileResolution(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("server error: {0}")]
    Bind(#[source] ServerError),

    #[error("URL push failed: {0}")]
    PushDelivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransferError> for SessionError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}

impl SessionError {
    /// `true` for errors caused by bad input rather than the network.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::FileResolution(_) | Self::Configuration(_))
    }
}
