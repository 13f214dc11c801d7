use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one client request. Clients bump `seq` per request, so a
/// retried request carries the same pair.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct RequestId {
    pub client_id: i64,
    pub seq: i64,
}

impl RequestId {
    pub fn new(client_id: i64, seq: i64) -> Self {
        Self { client_id, seq }
    }
}

/// Cluster-unique message id: the coordinator's ordinal plus the client
/// request id. A client retry reproduces the same id, so re-applying it
/// anywhere is a replace, not a duplicate.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct MessageId {
    pub origin: u32,
    pub client_id: i64,
    pub seq: i64,
}

impl MessageId {
    pub fn new(origin: u32, request_id: RequestId) -> Self {
        Self {
            origin,
            client_id: request_id.client_id,
            seq: request_id.seq,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.origin, self.client_id, self.seq)
    }
}

/// A stored message. The handoff fields describe the copy as held by the
/// current node: a flagged copy is waiting to be delivered to
/// `handoff_destination` under `handoff_username`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub timestamp_ms: i64,
    pub data: String,
    pub collection: String,
    pub is_handoff: bool,
    pub handoff_destination: String,
    pub handoff_username: String,
}

impl Message {
    /// An unstamped draft; the coordinator fills in `id` and `timestamp_ms`.
    pub fn new(data: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            id: MessageId::default(),
            timestamp_ms: 0,
            data: data.into(),
            collection: collection.into(),
            is_handoff: false,
            handoff_destination: String::new(),
            handoff_username: String::new(),
        }
    }

    pub(crate) fn clear_handoff(&mut self) {
        self.is_handoff = false;
        self.handoff_destination.clear();
        self.handoff_username.clear();
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerRequest {
    ReplicaPut {
        username: String,
        msg: Message,
        // whether this call is satisfying a handoff, as opposed to being a
        // first placement from the coordinator
        handoff: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerReply {
    ReplicaPut { ok: bool },
}
