use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{
    ApiResponse, DeleteWebhookRequest, GetUpdatesRequest, ReplyParameters, SendChatActionRequest,
    SendMessageRequest, SetWebhookRequest, Update,
};
use super::{ReplySink, TransportError};
use crate::config::TelegramConfig;
use crate::models::chat::{ConversationId, OutboundReply};

/// Extra room on top of the long-poll timeout before the HTTP client gives up.
const HTTP_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Minimal Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(
                config.polling_timeout_seconds + HTTP_TIMEOUT_MARGIN_SECS,
            ))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_base_url.trim_end_matches('/'),
                config.api_token
            ),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        if !envelope.ok {
            return Err(TransportError::Api {
                status: envelope.error_code.unwrap_or(status.as_u16()),
                description: envelope.description.unwrap_or_default(),
            });
        }

        envelope
            .result
            .ok_or_else(|| TransportError::Malformed(format!("{} returned no result", method)))
    }

    pub async fn send_message(&self, reply: &OutboundReply) -> Result<(), TransportError> {
        let request = SendMessageRequest {
            chat_id: reply.conversation_id,
            text: &reply.text,
            reply_parameters: reply.reply_to_message_id.map(|message_id| ReplyParameters {
                message_id,
                allow_sending_without_reply: true,
            }),
        };

        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        debug!("Sent {} chars to chat {}", reply.text.len(), reply.conversation_id);
        Ok(())
    }

    pub async fn send_chat_action(
        &self,
        chat_id: ConversationId,
        action: &str,
    ) -> Result<(), TransportError> {
        let _: bool = self
            .call("sendChatAction", &SendChatActionRequest { chat_id, action })
            .await?;
        Ok(())
    }

    pub async fn set_webhook(&self, url: &str) -> Result<(), TransportError> {
        let _: bool = self.call("setWebhook", &SetWebhookRequest { url }).await?;
        Ok(())
    }

    /// Remove any registered webhook; `getUpdates` answers 409 while one is set.
    /// Updates queued in the meantime are kept for the poller.
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let request = DeleteWebhookRequest { drop_pending_updates: false };
        let _: bool = self.call("deleteWebhook", &request).await?;
        Ok(())
    }

    /// Long-poll for updates newer than `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TransportError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: vec!["message"],
        };
        self.call("getUpdates", &request).await
    }
}

#[async_trait]
impl ReplySink for TelegramClient {
    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), TransportError> {
        self.send_message(reply).await
    }

    async fn send_typing(&self, conversation_id: ConversationId) {
        if let Err(e) = self.send_chat_action(conversation_id, "typing").await {
            warn!("Failed to send typing indicator to {}: {}", conversation_id, e);
        }
    }
}
