//! helix-diag: language server relaying helix analyzer diagnostics.
//!
//! ```text
//! main() -> load config -> RelaySettings
//!        -> stdio: one session on stdin/stdout
//!        -> tcp:   bind 127.0.0.1:<port>, write bound port to config,
//!                  serve one editor connection at a time
//! ```
//!
//! Logs never go to stdout: in stdio mode it carries the protocol.

use std::fs::{self, OpenOptions};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use helix_diag_config::{CONFIG_FILE_NAME, LoadedConfig, RelayConfig, config_dir};
use helix_diag_lsp::RelaySettings;

const LOG_FILE_NAME: &str = "helix-diag.log";

#[derive(Debug, Parser)]
#[command(name = "helix-diag", version, about = "Relay helix analyzer diagnostics to an LSP editor")]
struct Args {
    /// Config file (default: $HELIX_DIAG_CONFIG, ./config.json, ~/.helix-diag/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Speak LSP on stdin/stdout (default)
    #[arg(long, conflicts_with = "tcp")]
    stdio: bool,

    /// Listen for an editor on 127.0.0.1
    #[arg(long)]
    tcp: bool,

    /// TCP port; 0 picks a free one. Overrides `port` in the config.
    #[arg(long, requires = "tcp", value_name = "N")]
    port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Stdio,
    Tcp { port: u16 },
}

impl Args {
    fn transport(&self, config: &RelayConfig) -> Transport {
        if self.tcp {
            Transport::Tcp {
                port: self.port.or(config.port).unwrap_or(0),
            }
        } else {
            Transport::Stdio
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!("Failed to create log dir {}: {e}", parent.display()));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!("Failed to open log file {}: {e}", candidate.display()));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.helix-diag/logs/helix-diag.log
    if let Some(dir) = config_dir() {
        candidates.push(dir.join("logs").join(LOG_FILE_NAME));
    }

    // Fallback: ./.helix-diag/logs/helix-diag.log
    candidates.push(PathBuf::from(".helix-diag").join("logs").join(LOG_FILE_NAME));

    candidates
}

/// Where the bound port is written back: the loaded file, else the default
/// location.
fn port_file(loaded: &LoadedConfig) -> Option<PathBuf> {
    loaded
        .path
        .clone()
        .or_else(|| config_dir().map(|dir| dir.join(CONFIG_FILE_NAME)))
}

async fn run_tcp(settings: RelaySettings, port: u16, port_file: Option<&Path>) -> Result<()> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .await
        .with_context(|| format!("failed to bind 127.0.0.1:{port}"))?;
    let bound = listener
        .local_addr()
        .context("failed to read bound address")?
        .port();
    tracing::info!(port = bound, "Listening for editor connections");

    if let Some(path) = port_file
        && let Err(e) = RelayConfig::persist_port(path, bound)
    {
        // The editor can still be pointed at the port by hand.
        tracing::warn!("{e}");
    }

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return Ok(());
            }
        };
        let (stream, peer) = accepted.context("failed to accept editor connection")?;
        tracing::info!(%peer, "Editor connected");
        let (read, write) = stream.into_split();
        helix_diag_lsp::serve(read, write, settings.clone()).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let loaded = RelayConfig::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(path) = &loaded.path {
        tracing::info!(path = %path.display(), "Using config");
    }
    let settings = loaded.config.relay_settings();
    tracing::info!(
        analyzer = settings.analyzer_binary.as_deref().unwrap_or("<unset>"),
        timeout_ms = settings.analyzer_timeout.as_millis(),
        debounce_ms = settings.debounce.as_millis(),
        "Starting helix-diag {}",
        env!("CARGO_PKG_VERSION")
    );

    match args.transport(&loaded.config) {
        Transport::Stdio => helix_diag_lsp::run_stdio(settings).await,
        Transport::Tcp { port } => run_tcp(settings, port, port_file(&loaded).as_deref()).await?,
    }

    tracing::info!("helix-diag stopped");
    Ok(())
}
