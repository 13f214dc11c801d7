use anyhow::Result;
use clap::Parser;
use mailring::{Config, Node};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // init logger
    tracing_subscriber::fmt::init();

    let config = Config::parse();
    info!(
        "starting node {} of a {}-node cluster, replication factor {}",
        config.me,
        config.servers.len(),
        config.replicas
    );

    let node = Node::start(config).await?;
    info!("[node {}] serving on {}", node.me(), node.addr());

    tokio::signal::ctrl_c().await?;
    node.kill();
    Ok(())
}
