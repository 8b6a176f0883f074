use serde::{Deserialize, Serialize};

/// Telegram chat id; one conversation per chat.
pub type ConversationId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation. Serializes as `{"role": .., "content": ..}`,
/// the shape the chat completion API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

// ===== TRANSPORT-FACING MODELS =====

/// A text message delivered by the messaging transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub message_id: Option<i64>,
    pub sender: Option<String>,
    pub text: String,
}

/// A reply handed back to the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub conversation_id: ConversationId,
    pub reply_to_message_id: Option<i64>,
    pub text: String,
}
