pub mod chat;

pub use chat::{ConversationId, InboundMessage, OutboundReply, Role, Turn};
