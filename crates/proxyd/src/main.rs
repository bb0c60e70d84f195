//! The host-side proxy daemon: accepts WebSocket upgrades on /proxy
//! and relays each one to the TCP peer its dial frame names. Runs
//! next to whatever HTTP server publishes the filesystem tree.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "proxyd", version, about = "WebSocket to TCP proxy")]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "localhost:8100")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    info!(target: "proxyd", addr = %args.addr, "starting");

    core_wsproxy::server::serve(listener)
        .await
        .context("accept loop failed")?;
    Ok(())
}
