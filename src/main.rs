use anyhow::Context;
use clap::Parser;
use distributed_store::config::{ConfigOverrides, NodeConfig};
use distributed_store::replication::transport::{HttpTransport, PeerClient};
use distributed_store::server::Node;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Runs one node of the distributed store.
#[derive(Debug, Parser)]
#[command(name = "store-node", version, about)]
struct Cli {
    /// Path to the node's TOML configuration.
    #[arg(long, short, default_value = "config/node1.toml")]
    config: PathBuf,

    /// Overrides `node.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Overrides `telemetry.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::from_file(&cli.config)?;
    config.apply_overrides(&ConfigOverrides {
        bind: cli.bind,
        log_level: cli.log_level,
    });

    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .init();

    let topology = Arc::new(config.topology()?);
    let options = config.node_options(&topology)?;

    tracing::info!(
        "Starting node {} ({}) on {}",
        topology.local_id(),
        topology.local_role(),
        config.node.bind
    );
    for peer in topology.peers() {
        tracing::info!("  - peer {} ({}) at {}", peer.id, peer.role, peer.address);
    }

    // 1. Node components:
    let transport = Arc::new(HttpTransport::new(PeerClient::new(
        options.delivery_timeout,
        options.delivery_attempts,
    )));
    let node = Node::build(topology, &options, transport)?;

    // 2. Recovery:
    if config.recovery.on_startup {
        let replayer = node.replayer.clone();
        let limit = config.recovery.batch_limit;
        tokio::spawn(async move {
            let result = replayer.replay_pending_outgoing(limit).await;
            tracing::info!(
                "Startup recovery: {} pending, {} delivered",
                result.total_pending,
                result.succeeded
            );
        });
    }
    if config.recovery.interval_secs > 0 {
        node.replayer.clone().spawn_sweeper(
            Duration::from_secs(config.recovery.interval_secs),
            config.recovery.batch_limit,
        );
    }

    // 3. HTTP server:
    let app = node.router();
    let listener = tokio::net::TcpListener::bind(&config.node.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.node.bind))?;

    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app).await?;

    Ok(())
}
