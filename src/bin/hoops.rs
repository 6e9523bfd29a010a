//! hoops - command line client for the relay
//!
//! # Usage
//!
//! ```text
//! hoops watch                      # print a line for every refresh
//! hoops watch --screen scoreboard  # same, labelled for the relay logs
//! hoops notify                     # tell every screen that players changed
//! hoops notify "player 7 deleted"  # custom message
//! ```
//!
//! The relay URL comes from `--url`, then `HOOPS_URL`, then
//! `ws://127.0.0.1:5634`.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hoops_client::{notify, resolve_url, ClientEvent, RelayClient, RelayClientConfig};
use hoops_core::ScreenId;
use hoops_protocol::DEFAULT_NOTIFY_MESSAGE;

// ============================================================================
// CLI Arguments
// ============================================================================

/// hoops - real-time refresh client for the scoreboard relay
#[derive(Parser, Debug)]
#[command(name = "hoops", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stay connected and print every refresh notification
    Watch {
        /// Relay URL
        #[arg(long)]
        url: Option<String>,

        /// Screen label sent to the relay
        #[arg(long)]
        screen: Option<String>,
    },
    /// Send one notification and wait until the relay echoes it
    Notify {
        /// Relay URL
        #[arg(long)]
        url: Option<String>,

        /// Seconds to wait for the echo
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Message to broadcast
        #[arg(default_value = DEFAULT_NOTIFY_MESSAGE)]
        message: String,
    },
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("hoops_client=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    match cli.command {
        Command::Watch { url, screen } => watch(url, screen).await,
        Command::Notify {
            url,
            timeout,
            message,
        } => {
            let url = resolve_url(url);
            let receipt = notify(&url, &message, Duration::from_secs(timeout))
                .await
                .with_context(|| format!("Failed to notify relay at {url}"))?;
            println!("delivered as client {}", receipt.prefix);
            Ok(())
        }
    }
}

async fn watch(url: Option<String>, screen: Option<String>) -> Result<()> {
    let config = RelayClientConfig {
        url: resolve_url(url),
        screen_id: screen.map(ScreenId::new),
        ..Default::default()
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let cancel_token = CancellationToken::new();
    let client = RelayClient::new(config, event_tx, cancel_token.clone());
    let client_task = tokio::spawn(async move { client.run().await });

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(ClientEvent::Connected { prefix }) => println!("connected as client {prefix}"),
                Some(ClientEvent::Refresh { payload }) => println!("refresh: {payload}"),
                Some(ClientEvent::Disconnected) => println!("disconnected, retrying"),
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Interrupted, closing connection");
                cancel_token.cancel();
                break;
            }
        }
    }

    client_task.await.context("Relay client task failed")?;
    Ok(())
}
