use crate::messages::Message;
use std::collections::{hash_map::DefaultHasher, HashMap};
use std::hash::{Hash, Hasher};
use tokio::sync::Mutex;

const NUM_STRIPES: usize = 16;

/// In-memory local store: username to that user's messages, lock-striped so
/// concurrent applies for different users don't contend.
pub(crate) struct StripedStore {
    stripes: Vec<Mutex<HashMap<String, Vec<Message>>>>,
}

impl StripedStore {
    pub(crate) fn new() -> Self {
        let stripes = (0..NUM_STRIPES).map(|_| Mutex::new(HashMap::new())).collect();
        Self { stripes }
    }

    fn stripe_index(&self, username: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        username.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Store a message under a user. Re-delivery of an id already held
    /// replaces the stored copy, so replays and drained hints never
    /// duplicate.
    pub(crate) async fn apply(&self, username: &str, msg: Message) {
        let mut guard = self.stripes[self.stripe_index(username)].lock().await;
        let messages = guard.entry(username.to_string()).or_default();
        match messages.iter_mut().find(|m| m.id == msg.id) {
            Some(existing) => *existing = msg,
            None => messages.push(msg),
        }
    }

    pub(crate) async fn get(&self, username: &str) -> Vec<Message> {
        let guard = self.stripes[self.stripe_index(username)].lock().await;
        guard.get(username).cloned().unwrap_or_default()
    }
}
