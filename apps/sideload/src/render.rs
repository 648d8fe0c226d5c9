//! Console output: banner, progress lines and session notices.
//!
//! Periodic progress overwrites a single line with `\r`; terminal events
//! and notices are printed as full lines. Styling goes through `console`
//! and disappears when colours are disabled.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Mutex;

use console::{Term, style};
use sideload_session::{SessionReport, SessionState, USAGE};
use sideload_transfer::{
    LogSink, ProgressEvent, ProgressSink, TransferFailure, TransferSnapshot, TransferSummary,
};

use crate::format::{format_bytes, format_eta, format_rate};

/// Trailing blanks that wipe what a longer previous line left behind.
const LINE_PAD: usize = 10;

/// Startup facts shown before serving.
#[derive(Debug, Clone)]
pub struct Banner {
    pub target: IpAddr,
    pub host: IpAddr,
    pub port: u16,
    pub dir: PathBuf,
    pub chunk_size: usize,
    pub log_file: PathBuf,
    pub files: usize,
    pub total_bytes: u64,
    pub history_file: PathBuf,
}

/// Renders session output on stdout.
pub struct ConsoleRenderer {
    term: Mutex<Term>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self {
            term: Mutex::new(Term::stdout()),
        }
    }

    fn lines(&self, lines: &[String]) {
        let Ok(term) = self.term.lock() else {
            return;
        };
        for line in lines {
            let _ = term.write_line(line);
        }
    }

    pub fn line(&self, line: impl Into<String>) {
        self.lines(&[line.into()]);
    }

    pub fn banner(&self, banner: &Banner) {
        self.lines(&banner_lines(banner));
    }

    /// How to start the receiver and drive the session.
    pub fn instructions(&self, send_on_start: bool) {
        let mut lines = Vec::new();
        if !send_on_start {
            lines.push(
                style("NOTE: --no-send enabled (not pushing URLs).")
                    .yellow()
                    .bold()
                    .to_string(),
            );
        }
        lines.push(String::new());
        lines.push(format!(
            "{}{}",
            style("On the device: ").dim(),
            style("Remote Install → Receive URLs over the network")
                .cyan()
                .bold()
        ));
        lines.push(format!(
            "{}{}{}",
            style("Tip: Type ").dim(),
            style("R").yellow().bold(),
            style(" + Enter to re-send URLs anytime.").dim()
        ));
        lines.push(format!(
            "{}{}{}",
            style("Stop: Type ").dim(),
            style("Q").yellow().bold(),
            style(" + Enter to quit.").dim()
        ));
        lines.push(style(USAGE).dim().to_string());
        lines.push(String::new());
        self.lines(&lines);
    }

    pub fn state_changed(&self, state: SessionState) {
        let line = match state {
            SessionState::Serving => format!(
                "{}{}{}",
                style("HTTP server: ").dim(),
                style("RUNNING").green().bold(),
                style(" (waiting for downloads)").dim()
            ),
            SessionState::Pushing => style("Sending URL list…").blue().bold().to_string(),
            SessionState::Stopping => style("Stopping server…").red().bold().to_string(),
            SessionState::Init | SessionState::Building | SessionState::Stopped => return,
        };
        self.line(line);
    }

    pub fn report(&self, report: &SessionReport) {
        let delivered = report.pushes.iter().filter(|p| p.delivered).count();
        self.lines(&[
            format!(
                "{}{} of {} ({} pushes, {} delivered)",
                style("Sent: ").dim(),
                style(format_bytes(report.batch_sent)).white().bold(),
                format_bytes(report.total_bytes),
                report.pushes.len(),
                delivered
            ),
            style("Done.").green().bold().to_string(),
        ]);
    }

    pub fn error(&self, message: &str) {
        self.line(format!("{}{}", style("Error: ").red().bold(), message));
    }

    /// Prints the LAN addresses for `--list-addresses`.
    pub fn addresses(&self, ips: &[Ipv4Addr]) {
        if ips.is_empty() {
            self.line(style("No LAN IPv4 addresses found.").yellow().to_string());
            return;
        }
        let lines: Vec<String> = ips
            .iter()
            .map(|ip| style(ip).magenta().bold().to_string())
            .collect();
        self.lines(&lines);
    }

    fn overwrite(&self, line: &str) {
        let Ok(term) = self.term.lock() else {
            return;
        };
        let _ = term.write_str(&format!("\r{line}{}", " ".repeat(LINE_PAD)));
        let _ = term.flush();
    }

    fn finish_line(&self, line: &str) {
        let Ok(term) = self.term.lock() else {
            return;
        };
        let _ = term.clear_line();
        let _ = term.write_line(line);
    }
}

impl ProgressSink for ConsoleRenderer {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Progress(s) => self.overwrite(&progress_line(&s)),
            ProgressEvent::Done(s) => self.finish_line(&done_line(&s)),
            ProgressEvent::Failed(f) => self.finish_line(&failed_line(&f)),
        }
    }
}

/// Echoes operator commands and push outcomes from the audit trail.
impl LogSink for ConsoleRenderer {
    fn append(&self, line: &str) {
        if let Some(lines) = notice(line) {
            self.lines(&lines);
        }
    }
}

fn banner_lines(b: &Banner) -> Vec<String> {
    let field =
        |label: &str, value: String| format!("{}{value}", style(format!("{label:<12}: ")).dim());
    vec![
        style("╔══════════════════════════════════════════════════════════════╗")
            .cyan()
            .bold()
            .to_string(),
        style("║            sideload  •  LAN installer server                 ║")
            .cyan()
            .bold()
            .to_string(),
        style("╚══════════════════════════════════════════════════════════════╝")
            .cyan()
            .bold()
            .to_string(),
        field("Device IP", style(b.target).magenta().bold().to_string()),
        field("Host IP", style(b.host).magenta().bold().to_string()),
        field("Host Port", style(b.port).magenta().bold().to_string()),
        field("Serving dir", style(b.dir.display()).cyan().bold().to_string()),
        field(
            "Chunk size",
            style(format!("{} KB", b.chunk_size / 1024))
                .yellow()
                .bold()
                .to_string(),
        ),
        field("Log file", style(b.log_file.display()).green().bold().to_string()),
        field(
            "Files",
            format!(
                "{}{}{}",
                style(b.files).blue().bold(),
                style(" | ").dim(),
                style(format_bytes(b.total_bytes)).white().bold()
            ),
        ),
        field(
            "IP history",
            style(b.history_file.display()).blue().bold().to_string(),
        ),
        String::new(),
    ]
}

fn progress_line(s: &TransferSnapshot) -> String {
    let sep = style(" | ").dim();
    format!(
        "{}{}{}{sep}{}{sep}{}{sep}{}{sep}{}{}{}{}{}",
        style(s.client.ip()).magenta().bold(),
        style("  ►  ").dim(),
        style(&s.filename).cyan().bold(),
        style(format!("File {}", s.index)).blue().bold(),
        style(format!("{:6.2}%", s.file_percent)).green().bold(),
        style(format_rate(s.speed)).yellow().bold(),
        style(format_eta(s.eta)).white().bold(),
        style(" || Batch ").dim(),
        style(format!("{:6.2}%", s.batch_percent)).green().bold(),
        style(" @ ").dim(),
        style(format_rate(s.batch_speed)).yellow().bold(),
    )
}

fn done_line(s: &TransferSummary) -> String {
    let sep = style(" | ").dim();
    format!(
        "{}{}{}{}{sep}{}{sep}{}{sep}{}{sep}{}",
        style("✔ ").green().bold(),
        style(s.client.ip()).magenta().bold(),
        style("  ►  ").dim(),
        style(&s.filename).cyan().bold(),
        style(format!("File {}", s.index)).blue().bold(),
        style("DONE").green().bold(),
        style(format!("avg {}", format_rate(s.avg_speed).trim_start()))
            .yellow()
            .bold(),
        style(format_bytes(s.bytes_sent)).white().bold(),
    )
}

fn failed_line(f: &TransferFailure) -> String {
    format!(
        "{}{}",
        style("✖ ").red().bold(),
        style(format!(
            "{} -> {} | File {} | {} after {}",
            f.client.ip(),
            f.filename,
            f.index,
            f.reason,
            format_bytes(f.bytes_sent)
        ))
        .red()
        .bold()
    )
}

/// Operator-facing lines for the control and push outcome audit lines.
fn notice(line: &str) -> Option<Vec<String>> {
    match line {
        "CONTROL | help" => return Some(vec![style(USAGE).dim().to_string()]),
        "CONTROL | resend" => {
            return Some(vec![
                style("↻ Re-sending URL list…").yellow().bold().to_string(),
            ]);
        }
        _ => {}
    }
    if line == "URL PUSH: delivered (ACK received)" {
        return Some(vec![
            style("✔ URL list delivered (ACK received).")
                .green()
                .bold()
                .to_string(),
        ]);
    }
    if line == "URL PUSH: delivered (no ACK)" {
        return Some(vec![format!(
            "{}{}",
            style("⚠ URL list delivered (no ACK).").yellow().bold(),
            style("  (This is usually fine.)").dim()
        )]);
    }
    let err = line.strip_prefix("URL PUSH FAIL: ")?;
    Some(vec![
        format!(
            "{}{}",
            style("✖ URL push failed: ").red().bold(),
            style(err).red()
        ),
        style("  Server is still running. Start the receiver and type R + Enter to retry.")
            .dim()
            .to_string(),
    ])
}
