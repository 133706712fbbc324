//! mybabyd - The mybaby background service
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization
//! - The control engine (catalog, registry, quota, schedules, verdicts)
//! - Discovery, enforcement and advisory collaborators over HTTP
//! - IPC server

mod commands;
mod service;

use anyhow::Result;
use clap::Parser;
use mybaby_util::default_config_path;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::service::Service;

/// mybabyd - Screen-time policy service for a home gateway
#[derive(Parser, Debug)]
#[command(name = "mybabyd")]
#[command(about = "Screen-time policy service for a home gateway", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.config/mybaby/config.toml)
    #[arg(short, long, env = "MYBABY_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set MYBABY_SOCKET env var)
    #[arg(short, long, env = "MYBABY_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set MYBABY_DATA_DIR env var)
    #[arg(short, long, env = "MYBABY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "mybabyd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
