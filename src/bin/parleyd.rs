//! parley daemon - line-oriented broadcast chat server
//!
//! Runs in the foreground until SIGINT/SIGTERM, then stops accepting and
//! waits briefly for connected sessions to finish.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (12345)
//! parleyd
//!
//! # Custom port and capacity
//! parleyd --port 4000 --max-participants 200
//!
//! # Load settings from a TOML file
//! parleyd --config /etc/parley/parleyd.toml
//!
//! # Environment overrides
//! PARLEY_HOST=127.0.0.1 PARLEY_PORT=4000 parleyd
//!
//! # Enable debug logging
//! RUST_LOG=parleyd=debug parleyd
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parleyd::config::ServerConfig;
use parleyd::server::ChatServer;

/// parley daemon - broadcast chat server
#[derive(Parser, Debug)]
#[command(name = "parleyd", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind (overrides config and PARLEY_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config and PARLEY_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrent participants
    #[arg(long)]
    max_participants: Option<usize>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max) = self.max_participants {
            config.max_participants = max;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parleyd=info".parse()?)
                .add_directive("parley_protocol=info".parse()?),
        )
        .init();

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        addr = %config.bind_addr(),
        "parley daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = match ChatServer::bind(config, cancel_token).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Server error");
            return Err(e.into());
        }
    };

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("parley daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
