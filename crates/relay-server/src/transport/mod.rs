//! Messaging transport: the Telegram Bot API client, the update models and
//! the long-polling loop. The relay core only sees [`ReplySink`].

pub mod polling;
pub mod telegram;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::chat::{ConversationId, OutboundReply};

pub use telegram::TelegramClient;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Telegram network error: {0}")]
    Network(String),

    #[error("Telegram API error ({status}): {description}")]
    Api { status: u16, description: String },

    #[error("Failed to parse Telegram response: {0}")]
    Malformed(String),
}

/// Outgoing side of the messaging platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), TransportError>;

    /// Show a "typing..." indicator. Failures are logged and swallowed.
    async fn send_typing(&self, conversation_id: ConversationId);
}
