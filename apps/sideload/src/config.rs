//! Persistent configuration.
//!
//! Defaults for every session tunable, stored as TOML:
//! - Linux: `~/.config/sideload/config.toml`
//! - Windows: `%APPDATA%/sideload/config.toml`
//!
//! The IP history lives next to it as `ip_history.json`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sideload_file_server::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT};
use sideload_push::PushPolicy;
use sideload_session::SessionConfig;

/// Tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP port the files are served on.
    #[serde(default = "default_host_port")]
    pub host_port: u16,

    /// Response chunk size in KiB.
    #[serde(default = "default_chunk_kb")]
    pub chunk_kb: usize,

    /// Push attempts per send.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Seconds between failed push attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Seconds allowed for the push connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,

    /// Seconds to wait for the device to acknowledge a push.
    #[serde(default = "default_ack_wait")]
    pub ack_wait: f64,

    /// Push the URL list as soon as the server is up.
    #[serde(default = "default_true")]
    pub send_on_start: bool,

    /// Directory for audit log files (current directory when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Coloured console output.
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_host_port() -> u16 {
    DEFAULT_PORT
}

fn default_chunk_kb() -> usize {
    DEFAULT_CHUNK_SIZE / 1024
}

fn default_retries() -> u32 {
    PushPolicy::default().retries
}

fn default_retry_delay() -> f64 {
    PushPolicy::default().retry_delay.as_secs_f64()
}

fn default_connect_timeout() -> f64 {
    PushPolicy::default().connect_timeout.as_secs_f64()
}

fn default_ack_wait() -> f64 {
    PushPolicy::default().ack_wait.as_secs_f64()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_port: default_host_port(),
            chunk_kb: default_chunk_kb(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            connect_timeout: default_connect_timeout(),
            ack_wait: default_ack_wait(),
            send_on_start: true,
            log_dir: None,
            color: true,
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Directory audit logs are written to.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Builds the immutable session parameters; minimums are applied by the
    /// session itself.
    pub fn session_config(&self, target: IpAddr, host: IpAddr) -> SessionConfig {
        let mut config = SessionConfig::new(target, host);
        config.port = self.host_port;
        config.chunk_size = self.chunk_kb.saturating_mul(1024);
        config.send_on_start = self.send_on_start;
        config.push = PushPolicy {
            retries: self.retries,
            retry_delay: seconds(self.retry_delay),
            connect_timeout: seconds(self.connect_timeout),
            ack_wait: seconds(self.ack_wait),
        };
        config.normalized()
    }
}

/// Negative or non-finite values collapse to zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Directory holding the config and IP history files.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config").join("sideload"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("sideload"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/sideload"))
    }
}

fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
