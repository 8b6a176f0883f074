use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::{debug, warn};

use crate::state::AppState;
use crate::transport::types::Update;
use crate::utils::error::ApiError;

/// Telegram webhook: `POST /{token}`.
///
/// The reply pipeline runs on a spawned task so Telegram gets its 200 right away.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    payload: Result<Json<Update>, JsonRejection>,
) -> Result<&'static str, ApiError> {
    // Token first: an unknown path answers 404 whatever the body holds.
    if token != *state.webhook_token {
        warn!("Webhook call with unknown token");
        return Err(ApiError::NotFound("unknown webhook".to_string()));
    }

    let Json(update) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    debug!("Webhook update {}", update.update_id);
    state.dispatch(update);
    Ok("!")
}
