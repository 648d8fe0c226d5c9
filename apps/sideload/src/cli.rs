//! Command-line arguments.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

/// Serve installer files over HTTP and push their URLs to the device.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// File or directory to serve (.cia, .tik, .cetk, .3dsx)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Address put into the download URLs (auto-detected when omitted)
    pub host_ip: Option<IpAddr>,

    /// HTTP port to serve on
    pub host_port: Option<u16>,

    /// Device IPv4 address (skips the history picker)
    #[arg(long, visible_alias = "3ds-ip", value_name = "IP")]
    pub target: Option<Ipv4Addr>,

    /// Do not push the URL list on start (use R to send)
    #[arg(long)]
    pub no_send: bool,

    /// Push attempts per send
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds between failed push attempts
    #[arg(long, value_name = "SECONDS")]
    pub retry_delay: Option<f64>,

    /// Seconds allowed for the push connection
    #[arg(long, value_name = "SECONDS")]
    pub connect_timeout: Option<f64>,

    /// Seconds to wait for the device to acknowledge a push
    #[arg(long, value_name = "SECONDS")]
    pub ack_wait: Option<f64>,

    /// Response chunk size in KiB
    #[arg(long, value_name = "KIB")]
    pub chunk_kb: Option<usize>,

    /// Directory for the session audit log
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long)]
    pub no_color: bool,

    /// Print this machine's LAN IPv4 addresses and exit
    #[arg(long)]
    pub list_addresses: bool,
}

impl Cli {
    /// Overrides config values with the flags given on the command line.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.host_port {
            config.host_port = port;
        }
        if let Some(kb) = self.chunk_kb {
            config.chunk_kb = kb;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(delay) = self.retry_delay {
            config.retry_delay = delay;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(wait) = self.ack_wait {
            config.ack_wait = wait;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
        if self.no_send {
            config.send_on_start = false;
        }
        if self.no_color {
            config.color = false;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_current_directory() {
        let cli = Cli::try_parse_from(["sideload"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("."));
        assert!(cli.host_ip.is_none());
        assert!(cli.target.is_none());
        assert!(!cli.no_send);
    }

    #[test]
    fn positionals_and_target_alias() {
        let cli = Cli::try_parse_from([
            "sideload",
            "games",
            "192.168.1.10",
            "9000",
            "--3ds-ip",
            "192.168.1.76",
        ])
        .unwrap();
        assert_eq!(cli.path, PathBuf::from("games"));
        assert_eq!(cli.host_ip, Some("192.168.1.10".parse().unwrap()));
        assert_eq!(cli.host_port, Some(9000));
        assert_eq!(cli.target, Some(Ipv4Addr::new(192, 168, 1, 76)));
    }

    #[test]
    fn invalid_target_is_rejected() {
        let err = Cli::try_parse_from(["sideload", "--target", "3ds.local"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "sideload",
            ".",
            "192.168.1.10",
            "9000",
            "--no-send",
            "--retries",
            "2",
            "--ack-wait",
            "0.5",
            "--chunk-kb",
            "32",
            "--log-dir",
            "/tmp/logs",
            "--no-color",
        ])
        .unwrap();

        let config = cli.apply(Config::default());
        assert_eq!(config.host_port, 9000);
        assert_eq!(config.retries, 2);
        assert_eq!(config.ack_wait, 0.5);
        assert_eq!(config.chunk_kb, 32);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert!(!config.send_on_start);
        assert!(!config.color);
        // Untouched values keep the config's.
        assert_eq!(config.retry_delay, 1.0);
        assert_eq!(config.connect_timeout, 10.0);
    }
}
