use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::services::ReplyOrchestrator;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    active_conversations: usize,
    timestamp: DateTime<Utc>,
}

/// Keepalive probe used by the hosting platform.
pub async fn keepalive() -> &'static str {
    "Your bot is running!"
}

pub async fn health_check(
    State(orchestrator): State<Arc<ReplyOrchestrator>>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_conversations: orchestrator.store().len(),
            timestamp: Utc::now(),
        }),
    )
}
