use crate::messages::{Message, MessageId, PeerReply, PeerRequest};
use crate::{net, Shared, DRAIN_IDLE_DELAY, HANDOFF_RETRY_DELAY};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

/// Queue a copy this node is holding for an unreachable owner. Re-delivery
/// of an id already queued is dropped; the store replace covered it.
pub(crate) async fn enqueue(s: &Arc<Shared>, msg: Message) {
    let mut queue = s.handoffs.lock().await;
    if queue.iter().any(|m| m.id == msg.id) {
        return;
    }
    queue.push(msg);
}

// swap-remove keeps removal O(1); the drainer is the only consumer, so the
// reordering cannot race another removal
pub(crate) fn remove_by_id(queue: &mut Vec<Message>, id: MessageId) -> bool {
    match queue.iter().position(|m| m.id == id) {
        Some(index) => {
            queue.swap_remove(index);
            true
        }
        None => false,
    }
}

/// Background task: retry undelivered hints until their owners acknowledge.
/// Exits at the next iteration boundary once the node is killed.
pub(crate) async fn run_handoff_loop(s: Arc<Shared>) {
    debug!("[node {}] handoff drainer started", s.me);
    while !s.is_dead() {
        let pending: Vec<Message> = s.handoffs.lock().await.clone();
        if pending.is_empty() {
            sleep(DRAIN_IDLE_DELAY).await;
            continue;
        }

        for msg in pending {
            if s.is_dead() {
                return;
            }
            let request = PeerRequest::ReplicaPut {
                username: msg.handoff_username.clone(),
                msg: msg.clone(),
                handoff: true,
            };
            match net::call(&msg.handoff_destination, &request).await {
                Ok(PeerReply::ReplicaPut { ok: true }) => {
                    remove_by_id(&mut *s.handoffs.lock().await, msg.id);
                    debug!(
                        "[node {}] handed {} off to {}",
                        s.me, msg.id, msg.handoff_destination
                    );
                    // restart the pass so entries queued meanwhile get a turn
                    break;
                }
                _ => {
                    debug!(
                        "[node {}] {} still unreachable, keeping {}",
                        s.me, msg.handoff_destination, msg.id
                    );
                    sleep(HANDOFF_RETRY_DELAY).await;
                }
            }
        }
    }
    debug!("[node {}] handoff drainer stopped", s.me);
}
