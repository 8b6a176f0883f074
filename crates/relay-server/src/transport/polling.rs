use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::telegram::TelegramClient;
use super::TransportError;
use crate::services::Sleeper;
use crate::state::AppState;

/// Long-polling alternative to the webhook.
pub struct Poller {
    client: TelegramClient,
    state: AppState,
    sleeper: Arc<dyn Sleeper>,
    timeout_secs: u64,
    error_backoff: Duration,
    offset: i64,
}

impl Poller {
    pub fn new(
        client: TelegramClient,
        state: AppState,
        sleeper: Arc<dyn Sleeper>,
        timeout_secs: u64,
        error_backoff: Duration,
    ) -> Self {
        Self {
            client,
            state,
            sleeper,
            timeout_secs,
            error_backoff,
            offset: 0,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Fetch one batch and dispatch it. Returns the number of updates received.
    pub async fn poll_once(&mut self) -> Result<usize, TransportError> {
        let updates = self.client.get_updates(self.offset, self.timeout_secs).await?;
        let count = updates.len();

        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            self.state.dispatch(update);
        }

        if count > 0 {
            debug!("Dispatched {} updates, next offset {}", count, self.offset);
        }
        Ok(count)
    }

    pub async fn run(mut self) {
        info!("Polling Telegram for updates (timeout={}s)", self.timeout_secs);
        loop {
            if let Err(e) = self.poll_once().await {
                warn!("Polling failed: {}. Retrying in {:?}", e, self.error_backoff);
                self.sleeper.sleep(self.error_backoff).await;
            }
        }
    }
}
