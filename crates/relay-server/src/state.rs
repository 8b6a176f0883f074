use axum::extract::FromRef;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::chat::OutboundReply;
use crate::services::ReplyOrchestrator;
use crate::transport::types::Update;
use crate::transport::ReplySink;

/// Application state shared across handlers and the polling loop
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ReplyOrchestrator>,
    pub sink: Arc<dyn ReplySink>,
    /// Bot token; doubles as the secret webhook path segment
    pub webhook_token: Arc<str>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ReplyOrchestrator>,
        sink: Arc<dyn ReplySink>,
        webhook_token: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            orchestrator,
            sink,
            webhook_token: webhook_token.into(),
        }
    }

    /// Run the reply pipeline for a text update on its own task.
    /// Returns `None` for updates without a text message.
    pub fn dispatch(&self, update: Update) -> Option<JoinHandle<OutboundReply>> {
        let update_id = update.update_id;
        let Some(message) = update.into_inbound() else {
            debug!("Ignoring update {} without text", update_id);
            return None;
        };

        let orchestrator = self.orchestrator.clone();
        let sink = self.sink.clone();
        Some(tokio::spawn(async move {
            orchestrator.handle(&message, sink.as_ref()).await
        }))
    }
}

impl FromRef<AppState> for Arc<ReplyOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}
