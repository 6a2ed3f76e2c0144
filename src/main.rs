//! src/main.rs
//!
//! Binary entry point. Two modes, the second supplementing the original's
//! `query.py` operator entry point:
//!
//! - `gossip-fabric serve` (the default): initializes tracing, loads
//!   process configuration, instantiates `App`, and runs the node's HTTP
//!   surface until shutdown.
//! - `gossip-fabric query`: a one-shot CLI wrapper around the library's
//!   `quorum::quorum_read`, for an operator to read a specific node's
//!   converged state without starting a node process of their own.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use gossip_fabric::domain::PeerKey;
use gossip_fabric::quorum::{self, DEFAULT_MAX_ATTEMPTS};
use gossip_fabric::{App, Config};

#[derive(Parser)]
#[command(name = "gossip-fabric", about = "Gossip-based anti-entropy monitoring agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the node's HTTP surface. Gossip itself only starts once a
    /// caller issues `POST /start_node`.
    Serve,
    /// Runs the quorum-read protocol against a node list and prints the
    /// converged record as JSON.
    Query {
        /// A peer to sample, as `ip:port`. Repeat for every candidate.
        #[arg(long = "node", required = true)]
        nodes: Vec<String>,
        /// Number of peers that must agree on counter+digest.
        #[arg(long)]
        quorum: usize,
        /// The peer_key whose record is being read, as `ip:port`.
        #[arg(long)]
        target: String,
        /// Overrides every sampled peer's host, keeping its port
        /// (container-networking setups).
        #[arg(long)]
        docker_ip: Option<String>,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Query {
            nodes,
            quorum: quorum_size,
            target,
            docker_ip,
            timeout_secs,
        } => query(nodes, quorum_size, target, docker_ip, timeout_secs).await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    if let Err(e) = App::new(config)?.run().await {
        tracing::error!(error = %e, "💥 Application failed");
        std::process::exit(1);
    }
    Ok(())
}

async fn query(
    nodes: Vec<String>,
    quorum_size: usize,
    target: String,
    docker_ip: Option<String>,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let node_list: Vec<PeerKey> = nodes
        .iter()
        .map(|s| PeerKey::from_str(s))
        .collect::<Result<_, _>>()
        .context("every --node must be formatted as ip:port")?;
    let target_key = PeerKey::from_str(&target).context("--target must be formatted as ip:port")?;

    let http = quorum::http_client(Duration::from_secs(timeout_secs));
    let result = quorum::quorum_read(
        &http,
        &node_list,
        quorum_size,
        &target_key,
        docker_ip.as_deref(),
        DEFAULT_MAX_ATTEMPTS,
    )
    .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "record": result.record,
            "total_messages": result.total_messages,
        }))?
    );
    Ok(())
}
