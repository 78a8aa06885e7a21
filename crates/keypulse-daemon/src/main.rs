//! Keypulse daemon entry point.
//!
//! Runs the display server headless until interrupted. GUI and tray
//! frontends link the library instead and consume the event channel
//! themselves; here the events are rendered to the log.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use keypulse_daemon::{ServerConfig, ServerEvent, StatsServer};

/// Keypulse daemon - stats push server for keyboard status displays
#[derive(Parser, Debug)]
#[command(name = "keypulse-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Interface to bind (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// TCP port to listen on (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging, including per-packet and per-ack events
    #[arg(long, short)]
    verbose: bool,
}

fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keypulse={default_level}")));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Render observer events to the log, the way a GUI would render them to
/// widgets.
async fn drain_events(mut events: mpsc::UnboundedReceiver<ServerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::Log { message, .. } => info!("{message}"),
            ServerEvent::ConnectionsChanged { count } => info!("Active connections: {count}"),
            ServerEvent::StatusChanged { running } => debug!("Server running: {running}"),
            ServerEvent::Stats { cpu, mem } => trace!("CPU {cpu:.1}%, memory {mem:.1}%"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.verbose {
        config.debug = true;
    }

    info!("Starting keypulse daemon...");

    let (server, events) = StatsServer::new();
    server.set_debug(config.debug);
    tokio::spawn(drain_events(events));

    server.start(&config.host, config.port).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    server.stop().await;

    info!("Keypulse daemon stopped");
    Ok(())
}
