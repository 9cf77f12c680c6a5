//! Simulator binary
//!
//! Serves one simulated terminal until Ctrl+C.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use zkwire_core::TransportKind;
use zkwire_sim::{Simulator, SimulatorConfig};

/// Software ZKTeco terminal
#[derive(Parser, Debug)]
#[command(name = "zkwire-sim")]
#[command(about = "Simulated ZKTeco attendance terminal")]
#[command(version)]
struct Args {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long)]
    ip: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// CommKey password (0 disables authentication)
    #[arg(long)]
    password: Option<u32>,

    /// Serve UDP instead of TCP
    #[arg(long)]
    udp: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,zkwire_sim=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulatorConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulatorConfig::default(),
    };
    if let Some(ip) = args.ip {
        config.ip = ip;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if args.udp {
        config.transport = TransportKind::Udp;
    }

    tracing::info!("zkwire-sim v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Firmware: {}", config.profile.firmware_version);

    let simulator = Simulator::bind(config)
        .await
        .context("starting simulator")?;

    simulator
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    tracing::info!("Simulator stopped");
    Ok(())
}
