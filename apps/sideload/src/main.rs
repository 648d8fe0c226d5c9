//! sideload entry point.

mod audit_log;
mod cli;
mod config;
mod format;
mod history;
mod network;
mod render;

use std::io::BufReader;
use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sideload_session::{SessionOrchestrator, SessionSinks, resolve_targets};
use sideload_transfer::LogSink;
use tracing_subscriber::EnvFilter;

use crate::audit_log::AuditLog;
use crate::cli::Cli;
use crate::history::IpHistory;
use crate::render::{Banner, ConsoleRenderer};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries the progress line.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.apply(config::Config::load()?);
    if !config.color {
        console::set_colors_enabled(false);
    }
    let console = Arc::new(ConsoleRenderer::new());

    if cli.list_addresses {
        console.addresses(&network::local_ipv4_addrs());
        return Ok(ExitCode::SUCCESS);
    }

    // Fail on a bad path before asking for anything.
    let targets = match resolve_targets(&cli.path) {
        Ok(targets) => targets,
        Err(e) => {
            console.error(&e.to_string());
            return Ok(ExitCode::from(1));
        }
    };
    let batch = targets.into_batch();

    let mut history = IpHistory::load(config::config_dir()?.join("ip_history.json"));
    let target = match cli.target {
        Some(ip) => ip,
        None => history::pick_interactive(
            &history,
            &mut std::io::stdin().lock(),
            &mut std::io::stdout(),
        )?,
    };
    history.remember(target);
    if let Err(e) = history.save() {
        tracing::warn!(error = %e, "could not save IP history");
    }

    let host = match cli.host_ip {
        Some(ip) => ip,
        None => network::detect_host_ip()?,
    };

    let audit = Arc::new(AuditLog::create(config.log_dir()).context("cannot create audit log")?);
    let session_config = config.session_config(IpAddr::V4(target), host);

    // The port is filled in once the listener is bound.
    let mut banner = Some(Banner {
        target: session_config.target,
        host,
        port: session_config.port,
        dir: std::path::absolute(batch.root()).unwrap_or_else(|_| batch.root().to_path_buf()),
        chunk_size: session_config.chunk_size,
        log_file: audit.path().to_path_buf(),
        files: batch.file_count(),
        total_bytes: batch.total_bytes(),
        history_file: history.path().to_path_buf(),
    });

    let log: Arc<dyn LogSink> = {
        let audit = Arc::clone(&audit);
        let console = Arc::clone(&console);
        Arc::new(move |line: &str| {
            audit.append(line);
            console.append(line);
        })
    };
    let sinks = SessionSinks::new(console.clone(), log);
    let send_on_start = session_config.send_on_start;
    let orchestrator = Arc::new(SessionOrchestrator::new(session_config, sinks));

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let mut state = orchestrator.state();
        let session = Arc::clone(&orchestrator);
        let watcher = Arc::clone(&console);
        tokio::spawn(async move {
            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                // Updates coalesce, so Serving itself may never be seen.
                if let Some(addr) = session.local_addr()
                    && let Some(mut banner) = banner.take()
                {
                    banner.port = addr.port();
                    watcher.banner(&banner);
                    watcher.instructions(send_on_start);
                }
                watcher.state_changed(current);
            }
        });

        orchestrator
            .run_batch(batch, BufReader::new(std::io::stdin()), interrupted())
            .await
    });

    match result {
        Ok(report) => {
            console.report(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_configuration() => {
            console.error(&e.to_string());
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(anyhow::Error::new(e).context("session failed")),
    }
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}
