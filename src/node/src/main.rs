//! DAAN Agent Node - Main Binary
//!
//! Permissioned peer-to-peer agent node with:
//! - Invitation-gated admission backed by sponsor collateral
//! - Append-only, hash-chained event ledger with snapshots
//! - Elected super-node committee with multi-auditor cross-audits
//! - Automatic violation recording and collateral slashing

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use daan_node::{AgentNode, NodeConfig};

/// DAAN Agent Node CLI
#[derive(Parser)]
#[command(name = "daan-node")]
#[command(about = "DAAN Agent Node - accountable peer-to-peer agent network")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/daan/node.toml", env = "DAAN_CONFIG")]
    config: PathBuf,

    /// Data directory (overrides config)
    #[arg(long, env = "DAAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser)]
enum Command {
    /// Initialize a brand-new network; this node becomes genesis
    Init,

    /// Generate a node keypair
    Keygen {
        /// Output path for the key file
        #[arg(short, long, default_value = "./node_key.hex")]
        output: PathBuf,
    },

    /// Show node version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{log_level},daan_node=debug").into()),
        )
        .with_target(true)
        .init();

    // Key generation does not need a config file.
    if let Some(Command::Keygen { output }) = &cli.command {
        return generate_keypair(output);
    }
    if let Some(Command::Version) = &cli.command {
        println!("DAAN Node v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let mut config = if cli.config.exists() {
        NodeConfig::load(&cli.config)?
    } else if let Some(data_dir) = &cli.data_dir {
        NodeConfig::with_data_dir(data_dir.clone())
    } else {
        anyhow::bail!(
            "config file {:?} not found and no --data-dir given",
            cli.config
        );
    };
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }
    config.validate()?;

    let mut node = AgentNode::new(config)?;
    info!(node_id = %node.node_id(), "Agent node initialized");

    if let Some(Command::Init) = cli.command {
        node.init_network()?;
        println!("Network initialized; genesis node id: {}", node.node_id());
        return Ok(());
    }

    // Run node with graceful shutdown
    let run_result = tokio::select! {
        result = node.run() => Some(result),
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal (Ctrl+C)");
            None
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal (SIGTERM)");
            None
        }
    };
    match run_result {
        Some(Err(e)) => {
            error!("Node error: {}", e);
            return Err(e);
        }
        Some(Ok(())) => {}
        None => node.shutdown().await?,
    }

    info!("Node stopped gracefully");
    Ok(())
}

/// Generate a node keypair and print the derived node id
fn generate_keypair(output: &PathBuf) -> Result<()> {
    use daan_crypto::NodeKeypair;

    let keypair = NodeKeypair::generate();
    keypair.save(output)?;

    info!("Keypair generated:");
    info!("  Key file:   {:?}", output);
    info!("  Node id:    {}", keypair.node_id());
    info!("  Public key: {}", keypair.public_key_hex());
    Ok(())
}

/// Cross-platform shutdown signal handling
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");

    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix systems, only Ctrl+C is supported
    std::future::pending::<()>().await
}
