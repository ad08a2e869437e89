use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use peerwire_config::PeerConfig;
use peerwire_core::{Peer, PeerHandler};
use serde_json::Value;

mod telemetry;

/// peerwire - command-line client for the peerwire RPC peer protocol
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// WebSocket URL of the peer to connect to
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a request and print the response
    Request {
        /// Method name
        method: String,
        /// Request data as a JSON string
        #[arg(default_value = "{}")]
        data: String,
    },
    /// Send a notification (fire and forget)
    Notify {
        /// Method name
        method: String,
        /// Notification data as a JSON string
        #[arg(default_value = "{}")]
        data: String,
    },
    /// Stay connected and print inbound requests/notifications
    Listen,
}

/// Prints whatever the remote side sends us; replies to inbound requests
/// with `{"received": <method>}`.
struct PrintingHandler;

#[async_trait]
impl PeerHandler for PrintingHandler {
    async fn on_request(&self, method: &str, data: Value) -> Result<Value, (i32, String)> {
        println!("{} {method} {data}", "← request".bright_cyan().bold());
        Ok(serde_json::json!({"received": method}))
    }

    async fn on_notification(&self, method: &str, data: Value) {
        println!("{} {method} {data}", "← notify".bright_black().bold());
    }

    async fn on_close(&self, code: u16, reason: &str) {
        println!("{} {code} {reason}", "peer closed".bright_red().bold());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let config = PeerConfig::load().unwrap_or_default();
    let transport = peerwire_transport_ws::connect(&cli.url, &config)
        .await
        .with_context(|| format!("failed to connect to {}", cli.url))?;

    let peer = Peer::new(
        &cli.url,
        serde_json::json!({}),
        Box::new(transport),
        Arc::new(PrintingHandler),
        config,
    );

    match cli.command {
        Commands::Request { method, data } => {
            let data: Value = serde_json::from_str(&data).context("data must be valid JSON")?;
            match peer.request(method, data).await {
                Ok(Some(value)) => println!("{} {value}", "→ ok".green().bold()),
                Ok(None) => println!("{}", "→ voided: peer is reconnecting".yellow().bold()),
                Err(e) => println!("{} {e}", "→ error".red().bold()),
            }
            peer.close(4000, "request complete").await;
        }
        Commands::Notify { method, data } => {
            let data: Value = serde_json::from_str(&data).context("data must be valid JSON")?;
            peer.notify(method, data).await?;
            peer.close(4000, "notification sent").await;
        }
        Commands::Listen => {
            println!("{}", "listening, press ctrl-c to exit".bright_black());
            tokio::signal::ctrl_c().await?;
            peer.close(4000, "client exiting").await;
        }
    }

    Ok(())
}
