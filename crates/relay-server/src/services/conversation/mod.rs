//! Conversation memory
//!
//! In-memory, per-conversation rolling history:
//! - Thread-safe store (DashMap + per-conversation async mutex)
//! - FIFO eviction once a history reaches its turn cap

mod store;
pub mod types;

pub use store::{ConversationHandle, ConversationStore};
pub use types::{ConversationHistory, DEFAULT_MAX_TURNS};
