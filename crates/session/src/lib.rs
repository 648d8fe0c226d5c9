//! One serving session, end to end.
//!
//! This crate composes the file server and the push client into the
//! session the operator drives. It is a library crate with no console or
//! file output of its own: the binary supplies the [`SessionSinks`].
//!
//! # Lifecycle
//!
//! 1. **Build**: resolve the target path into a batch, bind the listener,
//!    build the URL list
//! 2. **Serve**: accept downloads until the session stops
//! 3. **Push**: send the URL list once on start and on every resend
//! 4. **Stop**: operator quit, interrupt, or server exit

pub mod control;
pub mod error;
pub mod orchestrator;
pub mod targets;
pub mod types;
pub mod urls;

pub use control::{ControlCommand, ControlHandler, ControlLoop, USAGE};
pub use error::SessionError;
pub use orchestrator::SessionOrchestrator;
pub use targets::{ACCEPTED_EXTENSIONS, ResolvedTargets, resolve_targets};
pub use types::{SessionConfig, SessionReport, SessionSinks, SessionState};
pub use urls::{build_urls, encode_file_name, push_payload};
