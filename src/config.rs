use anyhow::{ensure, Result};
use clap::Parser;

/// Node configuration. Every node in the cluster is started with the same
/// server list; the list order defines the ring.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// Ordered list of node addresses (host:port), identical on every node
    #[arg(short, long, required = true, value_delimiter = ',')]
    pub servers: Vec<String>,

    /// Index of this node in the server list
    #[arg(short, long, required = true)]
    pub me: usize,

    /// How many nodes hold each user's messages
    #[arg(short, long, default_value = "3")]
    pub replicas: usize,
}

impl Config {
    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(!self.servers.is_empty(), "server list is empty");
        ensure!(
            self.me < self.servers.len(),
            "me={} is out of range for {} servers",
            self.me,
            self.servers.len()
        );
        ensure!(
            self.replicas >= 1 && self.replicas <= self.servers.len(),
            "replicas={} must be between 1 and the cluster size {}",
            self.replicas,
            self.servers.len()
        );
        Ok(())
    }
}
