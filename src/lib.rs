mod config;
mod handlers;
mod hints;
mod messages;
mod net;
mod ring;
mod store;

pub use config::Config;
pub use messages::{Message, MessageId, RequestId};
pub use ring::{coordinator_index, preference_list};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};
use std::time::Duration;
use store::StripedStore;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::info;

// Outbound RPC budget, covering connect, request and reply.
pub(crate) const RPC_TIMEOUT: Duration = Duration::from_secs(1);
// How long a coordinator keeps sweeping before telling the client the
// cluster is too degraded to accept the write.
pub(crate) const PUT_DEADLINE: Duration = Duration::from_secs(10);
// Pause between coordinator sweeps that placed nothing.
pub(crate) const SWEEP_BACKOFF: Duration = Duration::from_millis(100);
// Pause after a hint delivery that was not acknowledged.
pub(crate) const HANDOFF_RETRY_DELAY: Duration = Duration::from_secs(1);
// Poll interval of the drainer while its queue is empty.
pub(crate) const DRAIN_IDLE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PutError {
    /// The caller addressed a node that does not coordinate this user.
    /// Re-address the write to the expected node.
    #[error("writes for this user go to node {expected}")]
    WrongCoordinator { expected: usize },
    /// Too few peers were reachable to place the replication factor before
    /// the deadline. Retriable.
    #[error("placed {got} of {needed} replicas before the deadline")]
    ReplicationTimedOut { needed: usize, got: usize },
}

pub(crate) struct Shared {
    pub(crate) servers: Vec<String>,
    pub(crate) me: usize,
    pub(crate) n_replicas: usize,
    pub(crate) store: StripedStore,
    // copies this node holds on behalf of unreachable owners; the acceptor
    // appends, the single drainer removes
    pub(crate) handoffs: Mutex<Vec<Message>>,
    pub(crate) dead: AtomicBool,
    pub(crate) shutdown: Notify,
    // per-connection tasks, tracked so kill can abort ones parked on idle
    // sockets waiting for a frame that will never come
    pub(crate) conns: StdMutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn n_servers(&self) -> usize {
        self.servers.len()
    }

    pub(crate) fn my_addr(&self) -> &str {
        &self.servers[self.me]
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }
}

/// Handle to a running node. Dropping the handle does not stop the node;
/// call [`Node::kill`].
pub struct Node {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind this node's address and spawn the serve loop and the handoff
    /// drainer.
    pub async fn start(config: Config) -> anyhow::Result<Node> {
        config.validate()?;
        let listener = TcpListener::bind(&config.servers[config.me]).await?;

        let shared = Arc::new(Shared {
            me: config.me,
            n_replicas: config.replicas,
            servers: config.servers,
            store: StripedStore::new(),
            handoffs: Mutex::new(Vec::new()),
            dead: AtomicBool::new(false),
            shutdown: Notify::new(),
            conns: StdMutex::new(Vec::new()),
        });

        let serve = tokio::spawn(net::serve(shared.clone(), listener));
        let drainer = tokio::spawn(hints::run_handoff_loop(shared.clone()));

        Ok(Node {
            shared,
            tasks: vec![serve, drainer],
        })
    }

    /// Accept a client write for `username` and drive it onto the
    /// replication factor's worth of distinct nodes, substituting fallbacks
    /// for unreachable primaries. Returns the id the message was stamped
    /// with.
    pub async fn coordinator_put(
        &self,
        username: &str,
        request_id: RequestId,
        message: Message,
    ) -> Result<MessageId, PutError> {
        handlers::handle_coordinator_put(&self.shared, username, request_id, message).await
    }

    /// Ask the node to shut down. The listener stops accepting, and the
    /// serve loop, drainer and per-connection tasks are aborted; in-flight
    /// deliveries are abandoned.
    pub fn kill(&self) {
        info!("[node {}] shutting down", self.shared.me);
        self.shared.dead.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
        for task in &self.tasks {
            task.abort();
        }
        for conn in self.shared.conns.lock().unwrap().drain(..) {
            conn.abort();
        }
    }

    pub fn me(&self) -> usize {
        self.shared.me
    }

    pub fn addr(&self) -> &str {
        self.shared.my_addr()
    }

    /// Which node coordinates writes for this user.
    pub fn coordinator_index(&self, username: &str) -> usize {
        ring::coordinator_index(username, self.shared.n_servers())
    }

    /// Snapshot of this node's stored copies for a user.
    pub async fn messages_for(&self, username: &str) -> Vec<Message> {
        self.shared.store.get(username).await
    }

    /// Snapshot of the hints this node is currently holding for other
    /// owners.
    pub async fn pending_handoffs(&self) -> Vec<Message> {
        self.shared.handoffs.lock().await.clone()
    }
}
