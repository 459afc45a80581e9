//! UDS CLI - Command-line tool for UDS diagnostics over ISO-TP
//!
//! Sends raw requests, reads DIDs, keeps sessions alive and downloads
//! Intel-HEX images.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uds_client::{UdsClient, UdsConfig};

use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "uds-cli")]
#[command(author, version, about = "UDS Diagnostics CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "UDS_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a raw request (hex, e.g. "22F190")
    Send {
        /// Request bytes in hex
        request: String,

        /// Use the functional address (no response is awaited)
        #[arg(long)]
        functional: bool,

        /// Do not wait for a response
        #[arg(long)]
        no_response: bool,
    },

    /// Read data identifier(s)
    Read {
        /// DID(s) in hex, e.g. F190
        #[arg(required = true)]
        dids: Vec<String>,
    },

    /// Download an Intel-HEX file
    Transfer {
        /// Firmware file path (.hex or .ihex)
        file: PathBuf,

        /// TransferData payload per request
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Compression method (dataFormatIdentifier high nibble)
        #[arg(long, default_value = "0")]
        compression: u8,

        /// Encryption method (dataFormatIdentifier low nibble)
        #[arg(long, default_value = "0")]
        encryption: u8,
    },

    /// Send tester present until interrupted
    Keepalive {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("uds_cli=debug,uds_client=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("uds_cli=info,uds_client=warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = config::load(cli.config.as_deref())?;
    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);
    let client = create_client(&config).await?;

    match &cli.command {
        Commands::Send {
            request,
            functional,
            no_response,
        } => commands::send(&client, request, *functional, *no_response, &ctx).await,

        Commands::Read { dids } => commands::read(&client, dids, &ctx).await,

        Commands::Transfer {
            file,
            chunk_size,
            compression,
            encryption,
        } => {
            commands::transfer(&client, file, *chunk_size, *compression, *encryption, &ctx).await
        }

        Commands::Keepalive { duration } => {
            commands::keepalive(&client, duration.map(Duration::from_secs), &ctx).await
        }
    }
}

/// Create a UDS client from the resolved configuration
async fn create_client(config: &UdsConfig) -> Result<UdsClient> {
    info!(
        p2_client_ms = config.timing.p2_client_ms,
        p2_server_ms = config.timing.p2_server_ms,
        pending_ceiling_ms = config.timing.pending_ceiling_ms,
        "Timing"
    );
    let client = UdsClient::from_config(config)
        .await
        .context("Failed to create UDS client")?;
    client
        .ensure_connected()
        .await
        .context("Transport is not connected")?;
    Ok(client)
}
