//! Device address history and the interactive picker.
//!
//! Stored as a JSON array of strings, most recent first.

use std::io::{BufRead, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::bail;
use console::style;

/// Addresses kept on disk.
pub const MAX_KEPT: usize = 20;

/// Addresses offered by the picker.
pub const MAX_SHOWN: usize = 10;

/// Previously used device addresses.
#[derive(Debug, Clone)]
pub struct IpHistory {
    path: PathBuf,
    ips: Vec<Ipv4Addr>,
}

impl IpHistory {
    /// Loads the history; a missing or unreadable file yields an empty one.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ips = match std::fs::read_to_string(&path) {
            Ok(content) => parse_entries(&content),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no IP history");
                Vec::new()
            }
        };
        Self { path, ips }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent first.
    pub fn ips(&self) -> &[Ipv4Addr] {
        &self.ips
    }

    /// Moves `ip` to the front, dropping duplicates and the overflow.
    pub fn remember(&mut self, ip: Ipv4Addr) {
        self.ips.retain(|known| *known != ip);
        self.ips.insert(0, ip);
        self.ips.truncate(MAX_KEPT);
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.ips)?;
        std::fs::write(&self.path, content)?;
        tracing::debug!(path = %self.path.display(), count = self.ips.len(), "IP history saved");
        Ok(())
    }
}

/// Keeps the string entries that parse as IPv4, in order.
fn parse_entries(content: &str) -> Vec<Ipv4Addr> {
    match serde_json::from_str::<Vec<serde_json::Value>>(content) {
        Ok(values) => values
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(|s| s.trim().parse().ok())
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed IP history");
            Vec::new()
        }
    }
}

/// What one line typed at the picker means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Pick(Ipv4Addr),
    BadNumber,
    Invalid,
}

/// Interprets picker input against the offered addresses.
///
/// Empty input selects the first entry, a number selects by position and
/// anything else must be a dotted-quad IPv4 address.
pub fn parse_choice(raw: &str, offered: &[Ipv4Addr]) -> Choice {
    let raw = raw.trim();
    if raw.is_empty() {
        return offered.first().copied().map_or(Choice::Invalid, Choice::Pick);
    }
    if !offered.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return match raw.parse::<usize>() {
            Ok(n) if (1..=offered.len()).contains(&n) => Choice::Pick(offered[n - 1]),
            _ => Choice::BadNumber,
        };
    }
    raw.parse().map_or(Choice::Invalid, Choice::Pick)
}

/// Prompts until a device address is chosen.
pub fn pick_interactive(
    history: &IpHistory,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<Ipv4Addr> {
    let offered = &history.ips()[..history.ips().len().min(MAX_SHOWN)];

    writeln!(out, "{}", style("Device IP selection:").blue().bold())?;
    let prompt = if offered.is_empty() {
        writeln!(out, "{}", style("No saved IPs yet.").dim())?;
        "Type the device IP address: "
    } else {
        writeln!(out, "{}", style("Previously used:").dim())?;
        for (i, ip) in offered.iter().enumerate() {
            writeln!(
                out,
                "  {} {}",
                style(format!("{})", i + 1)).yellow().bold(),
                style(ip).magenta().bold()
            )?;
        }
        writeln!(
            out,
            "{}",
            style("Enter a number to select, or type a new IP.").dim()
        )?;
        "Device IP (Enter = use #1): "
    };

    let mut line = String::new();
    loop {
        write!(out, "{}", style(prompt).cyan().bold())?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            bail!("no device address entered");
        }
        match parse_choice(&line, offered) {
            Choice::Pick(ip) => return Ok(ip),
            Choice::BadNumber => {
                writeln!(out, "{}", style("Invalid selection number.").red().bold())?
            }
            Choice::Invalid => writeln!(
                out,
                "{}",
                style("Please enter a valid IPv4 address (example: 192.168.1.76).")
                    .red()
                    .bold()
            )?,
        }
    }
}
