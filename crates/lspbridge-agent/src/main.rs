//! # lspbridge
//!
//! Launches a stdio language server and exposes it to browser clients over
//! WebSocket. Diagnostics go to stderr; stdout carries only the readiness line.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use lspbridge_core::logging::{LogFormat, init_subscriber};
use lspbridge_process::{ProcessSpec, TokioLauncher};
use lspbridge_server::{Bridge, BridgeConfig, BridgeServer, ServerConfig, wait_for_signal};
use lspbridge_settings::BridgeSettings;
use tracing::info;

/// How long the HTTP server may take to finish after shutdown starts.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay a stdio language server to WebSocket clients.
#[derive(Parser, Debug)]
#[command(name = "lspbridge", version, about = "Relay a stdio language server to WebSocket clients")]
struct Cli {
    /// Language server to launch (appended to the configured command).
    server_path: PathBuf,

    /// Port to listen on (default 5007).
    port: Option<u16>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Settings file (default `~/.lspbridge/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Launcher command; pass an empty string to execute the server directly.
    #[arg(long)]
    command: Option<String>,

    /// Log level or `EnvFilter` directive.
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Layer CLI flags over loaded settings.
    fn apply(&self, settings: &mut BridgeSettings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(command) = &self.command {
            settings.process.command.clone_from(command);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<BridgeSettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(lspbridge_settings::settings_path);
    let mut settings = lspbridge_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

fn check_server_path(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("language server not found: {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.format);
    check_server_path(&cli.server_path)?;

    let metrics = lspbridge_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let bridge = Arc::new(Bridge::new(BridgeConfig {
        terminate_grace: Duration::from_millis(settings.process.terminate_grace_ms),
    }));
    let spec = ProcessSpec::for_server(
        &settings.process.command,
        &settings.process.args,
        &cli.server_path,
    );
    bridge
        .start(&TokioLauncher, &spec)
        .await
        .context("failed to start language server")?;

    let server =
        BridgeServer::new(ServerConfig::from(&settings.server), Arc::clone(&bridge)).with_metrics(metrics);
    let (addr, serve) = match server.listen().await {
        Ok(bound) => bound,
        Err(err) => {
            bridge.shutdown().await;
            return Err(err).with_context(|| {
                format!(
                    "failed to bind {}:{}",
                    settings.server.host, settings.server.port
                )
            });
        }
    };

    println!("WebSocket bridge ready on ws://{addr}");

    wait_for_signal()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    server.shutdown().shutdown();
    bridge.shutdown().await;
    server
        .shutdown()
        .graceful_shutdown(vec![serve], SERVER_DRAIN_TIMEOUT)
        .await;
    Ok(())
}
