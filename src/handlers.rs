use crate::messages::{Message, MessageId, PeerReply, PeerRequest, RequestId};
use crate::{hints, net, ring, PutError, Shared, PUT_DEADLINE, SWEEP_BACKOFF};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, info, warn};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Drive a client write to `n_replicas` distinct nodes. Walks the preference
/// list, substituting fallbacks (with hints) for unreachable primaries, and
/// keeps sweeping until the count is reached or the deadline expires.
pub(crate) async fn handle_coordinator_put(
    s: &Arc<Shared>,
    username: &str,
    request_id: RequestId,
    mut message: Message,
) -> Result<MessageId, PutError> {
    let n_servers = s.n_servers();
    let expected = ring::coordinator_index(username, n_servers);
    // a message already flagged as a handoff is an in-flight retry being
    // re-driven through a substitute coordinator; let it through
    if expected != s.me && !message.is_handoff {
        return Err(PutError::WrongCoordinator { expected });
    }

    if !message.is_handoff {
        message.id = MessageId::new(s.me as u32, request_id);
        message.timestamp_ms = now_ms();
    }
    // the id of an in-flight retry is preserved: restamping would fork its
    // identity across replicas
    message.clear_handoff();
    let id = message.id;

    // the coordinator itself is the first replica
    s.store.apply(username, message.clone()).await;
    let mut replicated: HashSet<usize> = HashSet::from([s.me]);
    let mut assigned: HashSet<usize> = HashSet::new();
    let mut total = 1usize;

    let deadline = Instant::now() + PUT_DEADLINE;
    while total < s.n_replicas {
        let mut progressed = false;

        for i in ring::preference_list(username, n_servers) {
            if total >= s.n_replicas {
                break;
            }
            if i == s.me || replicated.contains(&i) {
                continue;
            }
            if Instant::now() >= deadline {
                warn!(
                    "[node {}] giving up on {} for {}: {} of {} replicas placed",
                    s.me, id, username, total, s.n_replicas
                );
                return Err(PutError::ReplicationTimedOut {
                    needed: s.n_replicas,
                    got: total,
                });
            }

            // primaries get a clean copy; fallbacks get a copy flagged with
            // the unreachable primary it stands in for
            let target = ring::handoff_target(username, i, &replicated, &assigned, n_servers, s.n_replicas);
            let mut copy = message.clone();
            match target {
                Some(t) => {
                    copy.is_handoff = true;
                    copy.handoff_destination = s.servers[t].clone();
                    copy.handoff_username = username.to_string();
                }
                None => copy.clear_handoff(),
            }

            let request = PeerRequest::ReplicaPut {
                username: username.to_string(),
                msg: copy,
                handoff: false,
            };
            match net::call(&s.servers[i], &request).await {
                Ok(PeerReply::ReplicaPut { ok: true }) => {
                    replicated.insert(i);
                    // the substitute now covers this primary's slot
                    if let Some(t) = target {
                        assigned.insert(t);
                    }
                    total += 1;
                    progressed = true;
                    debug!(
                        "[node {}] {} replicated at node {} ({}/{})",
                        s.me, id, i, total, s.n_replicas
                    );
                }
                Ok(PeerReply::ReplicaPut { ok: false }) => {
                    debug!("[node {}] node {} refused {}", s.me, i, id);
                }
                Err(e) => {
                    debug!("[node {}] replica put to node {} failed: {}", s.me, i, e);
                }
            }
        }

        if total < s.n_replicas && !progressed {
            // nothing moved this sweep; back off with a little jitter so
            // retrying coordinators don't hammer peers in lockstep
            let jitter = rand::rng().random_range(0..50u64);
            tokio::time::sleep(SWEEP_BACKOFF + Duration::from_millis(jitter)).await;
        }
    }

    info!(
        "[node {}] {} for {} placed on {} nodes",
        s.me, id, username, total
    );
    Ok(id)
}

/// Inbound replicate request. Applies to the local store; a copy that still
/// carries the handoff flag afterwards is queued for the drainer.
pub(crate) async fn handle_replica_put(
    s: &Arc<Shared>,
    username: &str,
    mut msg: Message,
    handoff: bool,
) -> PeerReply {
    if handoff {
        // the sender is draining a hint; this node is now the real owner
        msg.clear_handoff();
    }
    if msg.is_handoff && msg.handoff_destination == s.my_addr() {
        // flagged for this very node: it is the owner, nothing to hand off
        msg.clear_handoff();
    }

    s.store.apply(username, msg.clone()).await;

    if msg.is_handoff {
        debug!(
            "[node {}] holding {} for {} until {} is reachable",
            s.me, msg.id, msg.handoff_username, msg.handoff_destination
        );
        hints::enqueue(s, msg).await;
    }

    PeerReply::ReplicaPut { ok: true }
}
