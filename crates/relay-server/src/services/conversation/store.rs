use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::types::{ConversationHistory, DEFAULT_MAX_TURNS};
use crate::models::chat::{ConversationId, Turn};

/// Shared handle to one conversation's history.
///
/// Holding the lock serializes every mutation of that conversation while
/// leaving other conversations untouched.
pub type ConversationHandle = Arc<Mutex<ConversationHistory>>;

/// Process-lifetime, in-memory conversation store.
/// DashMap shards the id lookup; each history sits behind its own async mutex.
#[derive(Clone)]
pub struct ConversationStore {
    storage: Arc<DashMap<ConversationId, ConversationHandle>>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        info!("Initializing conversation store (max_turns={})", max_turns);
        Self {
            storage: Arc::new(DashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    /// Return the conversation's history, registering an empty one on first use.
    pub fn get_or_create(&self, id: ConversationId) -> ConversationHandle {
        // Clone the Arc out so the shard lock is released before anyone awaits.
        self.storage
            .entry(id)
            .or_insert_with(|| {
                debug!("Creating history for conversation {}", id);
                Arc::new(Mutex::new(ConversationHistory::new(self.max_turns)))
            })
            .value()
            .clone()
    }

    /// Append a turn to the conversation and trim it to the cap.
    ///
    /// `ReplyOrchestrator` does not go through here: it locks the handle from
    /// `get_or_create` once and pushes both turns of an exchange under that lock.
    pub async fn append(&self, id: ConversationId, turn: Turn) {
        let handle = self.get_or_create(id);
        let mut history = handle.lock().await;
        history.push(turn);
        debug!("Conversation {} now holds {} turns", id, history.len());
    }

    /// Copy of the conversation's turns, or `None` if it was never seen.
    pub async fn snapshot(&self, id: ConversationId) -> Option<Vec<Turn>> {
        let handle = self.storage.get(&id).map(|entry| entry.value().clone())?;
        let history = handle.lock().await;
        Some(history.to_vec())
    }

    /// Number of known conversations.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}
