//! mybabyctl - command line client for mybabyd
//!
//! Each invocation connects to the service socket, sends one command and
//! prints the response. `watch` keeps the connection open and prints
//! events until interrupted.

mod cli;
mod output;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mybaby_api::{Command, ResponseResult};
use mybaby_ipc::{IpcClient, IpcError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, OutputFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.to_command()?;
    let socket_path = cli
        .socket
        .clone()
        .unwrap_or_else(mybaby_util::default_socket_path);

    debug!(socket_path = %socket_path.display(), ?command, "Connecting to mybabyd");

    let client = IpcClient::connect(&socket_path)
        .await
        .with_context(|| format!("Failed to connect to mybabyd at {:?}", socket_path))?;

    match command {
        Command::SubscribeEvents => watch(client, cli.format).await,
        command => send(client, command, cli.format).await,
    }
}

async fn send(mut client: IpcClient, command: Command, format: OutputFormat) -> Result<()> {
    let response = client.send(command).await?;
    match response.result {
        ResponseResult::Ok(payload) => output::print_payload(&payload, format),
        ResponseResult::Err(e) => bail!("{:?}: {}", e.code, e.message),
    }
}

async fn watch(client: IpcClient, format: OutputFormat) -> Result<()> {
    let mut events = client.subscribe().await?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.next() => match event {
                Ok(event) => output::print_event(&event, format)?,
                Err(IpcError::ConnectionClosed) => {
                    eprintln!("mybabyd closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            },
        }
    }
}
