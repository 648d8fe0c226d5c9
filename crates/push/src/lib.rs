//! URL push channel to the device's remote-install receiver.
//!
//! The receiver listens on a fixed TCP port and expects one length-prefixed
//! frame carrying the newline-joined URL list. It may answer with a single
//! byte, which is treated as a courtesy acknowledgment only.
//!
//! # Wire format
//!
//! See [`wire`] module for the framing.

pub mod client;
pub mod error;
pub mod policy;
pub mod wire;

pub use client::{PushAttempt, PushClient, PushOutcome};
pub use error::PushError;
pub use policy::PushPolicy;

use std::time::Duration;

/// Port the remote-install receiver listens on.
pub const RECEIVER_PORT: u16 = 5000;

/// Upper bound of a single acknowledgment read.
pub const ACK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Pause between two acknowledgment reads.
pub const ACK_POLL_SLEEP: Duration = Duration::from_millis(50);
