//! veilhop CLI
//!
//! Runs a veilhop node and talks to a running gateway's control API.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;

use veilhop_api_client::{ApiClient, DEFAULT_API_URL};
use veilhop_daemon::{IdentitySource, NodeConfig, NodeService};
use veilhop_keystore::expand_path;
use veilhop_logging::LogLevel;
use veilhop_network::{parse_bootstrap_addr, Multiaddr, NetworkConfig};

/// veilhop - peer-to-peer multi-hop tunnels
#[derive(Parser)]
#[command(name = "veilhop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Control API of the gateway to talk to
    #[arg(long, global = true, default_value = DEFAULT_API_URL)]
    api: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node until interrupted
    Run {
        /// Relay and answer probes only; do not serve the control API
        #[arg(long)]
        peer_only: bool,

        /// Listen address (repeatable)
        #[arg(short, long)]
        listen: Vec<Multiaddr>,

        /// DHT bootstrap peer with /p2p/ suffix (repeatable, replaces the defaults)
        #[arg(short, long)]
        bootstrap: Vec<String>,

        /// Control API bind address
        #[arg(long, default_value = "127.0.0.1:8080")]
        api_addr: SocketAddr,

        /// Disable local network discovery
        #[arg(long)]
        no_mdns: bool,

        /// Path to the identity key file
        #[arg(long)]
        keyfile: Option<PathBuf>,

        /// Use a fresh identity instead of the key file
        #[arg(long, conflicts_with = "keyfile")]
        ephemeral_identity: bool,
    },

    /// List known peers and their latency
    Peers,

    /// Establish a tunnel
    Connect {
        /// Number of peers in the path
        #[arg(short = 'n', long, default_value = "1", allow_negative_numbers = true)]
        hops: i64,
    },

    /// Tear the tunnel down
    Disconnect,

    /// Show node and tunnel status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    veilhop_logging::try_init(LogLevel::from_verbosity(cli.verbose))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    match cli.command {
        Commands::Run {
            peer_only,
            listen,
            bootstrap,
            api_addr,
            no_mdns,
            keyfile,
            ephemeral_identity,
        } => {
            let identity = if ephemeral_identity {
                IdentitySource::Ephemeral
            } else {
                match keyfile {
                    Some(path) => IdentitySource::Keyfile(expand_path(&path)),
                    None => IdentitySource::default(),
                }
            };
            let network = network_config(listen, &bootstrap, !no_mdns)?;
            let config = NodeConfig {
                peer_only,
                identity,
                network,
                api_addr,
                ..NodeConfig::default()
            };
            run_node(config).await?;
        }
        Commands::Peers => peers(&cli.api).await?,
        Commands::Connect { hops } => connect(&cli.api, hops).await?,
        Commands::Disconnect => disconnect(&cli.api).await?,
        Commands::Status => status(&cli.api).await?,
    }

    Ok(())
}

fn network_config(
    listen: Vec<Multiaddr>,
    bootstrap: &[String],
    enable_mdns: bool,
) -> Result<NetworkConfig> {
    let mut config = NetworkConfig {
        enable_mdns,
        ..NetworkConfig::default()
    };
    if !listen.is_empty() {
        config.listen_addrs = listen;
    }
    if !bootstrap.is_empty() {
        config.bootstrap_peers = bootstrap
            .iter()
            .map(|addr| {
                parse_bootstrap_addr(addr).with_context(|| {
                    format!("Invalid bootstrap address (expected .../p2p/<peer id>): {}", addr)
                })
            })
            .collect::<Result<_>>()?;
    }
    Ok(config)
}

// ============================================================================
// Node
// ============================================================================

async fn run_node(config: NodeConfig) -> Result<()> {
    info!(
        "Starting veilhop node in {} mode",
        if config.peer_only { "peer-only" } else { "gateway" }
    );

    let node = NodeService::start(config).context("Failed to start node")?;
    node.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await?;

    Ok(())
}

// ============================================================================
// Control API commands
// ============================================================================

async fn peers(api: &str) -> Result<()> {
    let client = ApiClient::new(api)?;
    let peers = client.peers().await?;

    if peers.is_empty() {
        println!("No peers discovered yet");
        return Ok(());
    }

    println!("{:<54} {:>10}  ADDRESSES", "PEER", "LATENCY");
    for peer in peers {
        let latency = match peer.latency_ms {
            0 => "unprobed".to_string(),
            9999 => "unreach".to_string(),
            ms => format!("{} ms", ms),
        };
        println!("{:<54} {:>10}  {}", peer.id, latency, peer.addrs.join(", "));
    }

    Ok(())
}

async fn connect(api: &str, hops: i64) -> Result<()> {
    info!("Requesting a {}-hop tunnel...", hops);

    let client = ApiClient::new(api)?;
    let result = client.connect(hops).await?;
    if result.status != "success" {
        bail!("{}", result.message);
    }

    println!("{}", result.message);
    if let Some(entry) = &result.entry_peer_id {
        println!("Entry peer:   {}", entry);
    }
    if let Some(exit) = result.path.last() {
        println!("Exit peer:    {}", exit);
    }
    if let Some(key) = &result.exit_public_key {
        println!("Exit key:     {}", key);
    }
    if let Some(key) = &result.seeker_public_key {
        println!("Local key:    {}", key);
    }

    Ok(())
}

async fn disconnect(api: &str) -> Result<()> {
    let client = ApiClient::new(api)?;
    let result = client.disconnect().await?;
    println!("{}", result.message);
    Ok(())
}

async fn status(api: &str) -> Result<()> {
    let client = ApiClient::new(api)?;
    let status = client.status().await?;

    println!("veilhop Status");
    println!("==============");
    println!("Peer ID:       {}", status.peer_id);
    for addr in &status.listen_addrs {
        println!("Listening:     {}", addr);
    }
    println!(
        "Peers:         {} known, {} reachable",
        status.known_peers, status.reachable_peers
    );
    println!("Connected:     {}", status.connected);
    if status.connected {
        println!("Path:          {}", status.path.join(" -> "));
        if let Some(key) = &status.exit_public_key {
            println!("Exit key:      {}", key);
        }
        if let Some(name) = &status.interface_name {
            println!("Interface:     {}", name);
        }
    }
    println!(
        "Relayed:       {} forwarded, {} terminated, {} aborted",
        status.relay.requests_forwarded,
        status.relay.requests_terminated,
        status.relay.requests_aborted
    );

    Ok(())
}
