//! transfer-host - serve the money-transfer page over HTTP

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use transfer_host::{HostConfig, HostHandle, DEFAULT_DOCUMENT, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "transfer-host")]
#[command(about = "Serve the money-transfer page under test")]
#[command(version)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// HTML document to serve
    #[arg(short, long, default_value = DEFAULT_DOCUMENT)]
    document: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = HostConfig {
        bind: cli.bind,
        port: cli.port,
        document: cli.document,
    };

    let host = HostHandle::start(&config).await?;
    info!("Serving {} at {}", config.document.display(), host.base_url());

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    host.stop().await?;
    Ok(())
}
