//! Operator control loop.
//!
//! Reads line commands on a dedicated OS thread so a blocked read never
//! keeps the async runtime alive at exit.

use std::io::BufRead;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

/// Help text shown on start and on `h`.
pub const USAGE: &str = "[Controls] R = re-send URLs, Q = quit, H = help";

/// Pause after end-of-input or a read error before reading again.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(200);

/// A recognised operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Resend,
    Quit,
    Help,
}

impl ControlCommand {
    /// Parses one input line (trimmed, case-insensitive).
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "re" | "resend" => Some(Self::Resend),
            "q" | "quit" | "exit" => Some(Self::Quit),
            "h" | "help" | "?" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Reactions to operator commands.
///
/// Handlers own all output; the loop itself never prints.
pub trait ControlHandler: Send + 'static {
    fn on_resend(&mut self);

    fn on_stop(&mut self);

    fn on_help(&mut self);
}

/// Blocking command loop over a line reader.
pub struct ControlLoop<R, H> {
    reader: R,
    handler: H,
    idle_backoff: Duration,
}

impl<R, H> ControlLoop<R, H>
where
    R: BufRead + Send + 'static,
    H: ControlHandler,
{
    pub fn new(reader: R, handler: H) -> Self {
        Self {
            reader,
            handler,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Runs until a quit command. End-of-input is not a quit: the loop
    /// sleeps for the idle backoff and reads again.
    pub fn run(mut self) {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    thread::sleep(self.idle_backoff);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "control input read failed");
                    thread::sleep(self.idle_backoff);
                    continue;
                }
            }

            match ControlCommand::parse(&line) {
                Some(ControlCommand::Resend) => self.handler.on_resend(),
                Some(ControlCommand::Quit) => {
                    self.handler.on_stop();
                    return;
                }
                Some(ControlCommand::Help) => self.handler.on_help(),
                None => trace!(input = line.trim(), "ignoring unknown command"),
            }
        }
    }

    /// Runs the loop on a named OS thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("sideload-control".into())
            .spawn(move || self.run())
    }
}
