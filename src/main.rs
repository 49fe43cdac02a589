//! Skywire VPN client CLI
//!
//! Creates a local TUN device and relays it to a Skywire VPN server until
//! interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use skywire_vpn::config::load_json;
use skywire_vpn::linux::LinuxHost;
use skywire_vpn::{Connection, StaticTunnel, DEFAULT_CONFIG_FILE};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "skywire-vpn")]
#[command(about = "Skywire VPN client relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG (standard), then RUST_LOG_LEVEL (e.g. "debug"), then --verbose
    let fallback = if cli.verbose { "debug" } else { "info" };
    let default_level = std::env::var("RUST_LOG_LEVEL").unwrap_or_else(|_| fallback.to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .ok();

    run(&cli.config).await
}

/// Relay until Ctrl+C or until the attempt budget runs out.
async fn run(config_path: &str) -> Result<()> {
    info!("Loading configuration from: {}", config_path);

    let config = load_json(config_path)
        .with_context(|| format!("Failed to load configuration from: {config_path}"))?;

    let host = Arc::new(LinuxHost::new(&config.tun).context("Failed to set up host")?);
    let tunnel = Arc::new(StaticTunnel::new(
        config.tun.address,
        config.tun.prefix_len,
        config.tun.mtu,
    ));

    let conn = Arc::new(Connection::new(config, host, tunnel));
    let mut handle = conn.start();

    let result = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            conn.stop();
            handle.await
        }
    };

    match result.context("Relay task panicked")? {
        Ok(()) => {
            info!("Relay stopped");
            Ok(())
        }
        Err(e) => {
            error!("Relay failed: {}", e);
            Err(e.into())
        }
    }
}
